use crate::config::PipelineConfig;
use crate::error::{AnagramError, Stage};
use crate::local_grouper::{self, GroupStats};
use crate::output::{self, EmitStats};
use crate::pair_merger::{MergeStrategy, PairMerger};
use crate::partitioner::Partitioner;
use crate::scheduler::{MergeScheduler, ScheduleStats};
use crate::worker_pool::{RunControl, WorkerPool};
use crate::workspace::{IdAllocator, RunWorkspace};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    pub partition_ms: u64,
    pub local_group_ms: u64,
    pub merge_ms: u64,
    pub emit_ms: u64,
    pub total_ms: u64,
}

/// Summary of one successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: PathBuf,
    pub output_path: PathBuf,
    pub strategy: MergeStrategy,
    pub worker_pool_size: usize,
    pub source_lines: u64,
    pub partitions: usize,
    pub merge_levels: usize,
    pub pair_merges: usize,
    pub carried_files: usize,
    pub groups_emitted: u64,
    pub words_emitted: u64,
    pub singletons_dropped: u64,
    pub elapsed_ms: StageTimings,
}

/// Runs partition, local grouping, merging and emit for one source file at a time
pub struct AnagramPipeline {
    config: PipelineConfig,
    cancelled: Arc<AtomicBool>,
}

impl AnagramPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, AnagramError> {
        config.validate()?;
        Ok(Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Setting this flag interrupts the current run and any later one
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Groups the anagrams of `source` and returns the output file path
    pub fn process(&self, source: &Path) -> Result<PathBuf, AnagramError> {
        self.process_with_report(source).map(|report| report.output_path)
    }

    #[tracing::instrument(name = "process", skip(self, source), fields(source = %source.display()))]
    pub fn process_with_report(&self, source: &Path) -> Result<RunReport, AnagramError> {
        self.validate_source(source)?;

        let control = RunControl::with_flag(Arc::clone(&self.cancelled), self.config.timeout);
        let pool = WorkerPool::new(self.config.worker_pool_size)?;
        let workspace = RunWorkspace::create(&self.config.temp_root, source, &self.config.file_extension)?;
        tracing::debug!(dir = %workspace.dir().display(), "working directory created");

        match self.run(source, &workspace, &pool, &control) {
            Ok(report) => {
                tracing::info!(
                    output = %report.output_path.display(),
                    groups = report.groups_emitted,
                    total_ms = report.elapsed_ms.total_ms,
                    "run complete"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, stage = ?e.stage(), "run failed");
                workspace.discard();
                Err(e)
            }
        }
    }

    /// Rejects sources that are missing, not regular files, of the wrong
    /// extension, or that cannot be opened
    pub fn validate_source(&self, source: &Path) -> Result<(), AnagramError> {
        if !source.exists() {
            return Err(AnagramError::source_unreadable(source, "does not exist"));
        }
        if !source.is_file() {
            return Err(AnagramError::source_unreadable(source, "is not a regular file"));
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !name.ends_with(&self.config.file_extension) {
            return Err(AnagramError::source_unreadable(
                source,
                format!("expected a {} file", self.config.file_extension),
            ));
        }
        File::open(source).map_err(|e| AnagramError::source_unreadable(source, e.to_string()))?;
        Ok(())
    }

    fn run(
        &self,
        source: &Path,
        workspace: &RunWorkspace,
        pool: &WorkerPool,
        control: &RunControl,
    ) -> Result<RunReport, AnagramError> {
        let started = Instant::now();
        let mut timings = StageTimings::default();
        let mut ids = IdAllocator::new();

        let stage_start = Instant::now();
        let partitions = Partitioner::new(self.config.max_lines_per_partition)
            .partition(source, workspace, &mut ids, control)?;
        timings.partition_ms = elapsed_ms(stage_start);
        tracing::info!(
            partitions = partitions.len(),
            lines = partitions.lines,
            elapsed_ms = timings.partition_ms,
            "divide stage complete"
        );

        let stage_start = Instant::now();
        let grouped: Vec<GroupStats> = pool.run_level(Stage::LocalGroup, &partitions.ids, control, |&id| {
            local_grouper::group_partition(workspace, id, control)
        })?;
        timings.local_group_ms = elapsed_ms(stage_start);
        tracing::info!(
            groups = grouped.iter().map(|s| s.groups).sum::<u64>(),
            words = grouped.iter().map(|s| s.words).sum::<u64>(),
            elapsed_ms = timings.local_group_ms,
            "conquer stage complete"
        );

        let stage_start = Instant::now();
        let scheduler = MergeScheduler::new(
            workspace,
            pool,
            PairMerger::new(self.config.merge_strategy),
            control,
        );
        let (root, schedule): (_, ScheduleStats) = scheduler.merge_all(&partitions.ids, &mut ids)?;
        timings.merge_ms = elapsed_ms(stage_start);
        tracing::info!(
            levels = schedule.levels,
            pair_merges = schedule.pair_merges,
            carried = schedule.carried_files,
            groups = schedule.groups,
            elapsed_ms = timings.merge_ms,
            "merge stage complete"
        );

        control.checkpoint(Stage::Emit)?;
        let stage_start = Instant::now();
        let (output_path, emitted): (PathBuf, EmitStats) = output::emit_groups(
            &workspace.file_path(root),
            &self.config.output_dir,
            source,
            &self.config.file_extension,
            control,
        )?;
        timings.emit_ms = elapsed_ms(stage_start);
        tracing::info!(
            groups = emitted.groups_emitted,
            dropped = emitted.singletons_dropped,
            elapsed_ms = timings.emit_ms,
            "emit stage complete"
        );

        if let Err(e) = workspace.finish(root) {
            tracing::warn!(error = %e, "output written but working directory cleanup failed");
        }
        timings.total_ms = elapsed_ms(started);

        Ok(RunReport {
            source: source.to_path_buf(),
            output_path,
            strategy: self.config.merge_strategy,
            worker_pool_size: pool.size(),
            source_lines: partitions.lines,
            partitions: partitions.len(),
            merge_levels: schedule.levels,
            pair_merges: schedule.pair_merges,
            carried_files: schedule.carried_files,
            groups_emitted: emitted.groups_emitted,
            words_emitted: emitted.words_emitted,
            singletons_dropped: emitted.singletons_dropped,
            elapsed_ms: timings,
        })
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
