use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Partition,
    LocalGroup,
    Merge,
    Emit,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Partition => "partition",
            Stage::LocalGroup => "local-group",
            Stage::Merge => "merge",
            Stage::Emit => "emit",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AnagramError {
    #[error("source {} is not readable: {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("IO error during {stage} ({context}): {source}")]
    Io {
        stage: Stage,
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("run interrupted during {stage}")]
    Interrupted { stage: Stage },

    #[error("run exceeded its {}s deadline during {stage}", limit.as_secs_f64())]
    Timeout { stage: Stage, limit: Duration },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AnagramError {
    pub fn source_unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AnagramError::SourceUnreadable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(stage: Stage, context: impl Into<String>, source: io::Error) -> Self {
        AnagramError::Io {
            stage,
            context: context.into(),
            source,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            AnagramError::Io { stage, .. }
            | AnagramError::Interrupted { stage }
            | AnagramError::Timeout { stage, .. } => Some(*stage),
            AnagramError::SourceUnreadable { .. } => Some(Stage::Validate),
            AnagramError::Config(_) => None,
        }
    }

    /// Process exit code for the CLI wrapper
    pub fn exit_code(&self) -> i32 {
        match self {
            AnagramError::SourceUnreadable { .. } => 2,
            AnagramError::Io { .. } => 3,
            AnagramError::Config(_) => 64,
            AnagramError::Timeout { .. } => 124,
            AnagramError::Interrupted { .. } => 130,
        }
    }
}

/// Attaches a stage and a context string to an `io::Result`
pub trait IoContext<T> {
    fn stage(self, stage: Stage, context: impl FnOnce() -> String) -> Result<T, AnagramError>;
}

impl<T> IoContext<T> for Result<T, io::Error> {
    fn stage(self, stage: Stage, context: impl FnOnce() -> String) -> Result<T, AnagramError> {
        self.map_err(|e| AnagramError::io(stage, context(), e))
    }
}
