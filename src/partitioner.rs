use crate::error::{AnagramError, IoContext, Stage};
use crate::worker_pool::{CHECKPOINT_INTERVAL, RunControl};
use crate::workspace::{FileId, IdAllocator, RunWorkspace};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Partition files produced from one source, in read order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSet {
    pub ids: Vec<FileId>,
    pub lines: u64,
}

impl PartitionSet {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Splits a source file into runs of at most `max_lines` lines
pub struct Partitioner {
    max_lines: usize,
}

impl Partitioner {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
        }
    }

    /// Writes partitions into the workspace with ids taken from `ids`.
    ///
    /// An empty source still yields one (empty) partition so later stages always
    /// have a file to consume. On a write error the partitions written so far are
    /// left for the caller to discard with the workspace.
    pub fn partition(
        &self,
        source: &Path,
        workspace: &RunWorkspace,
        ids: &mut IdAllocator,
        control: &RunControl,
    ) -> Result<PartitionSet, AnagramError> {
        let file = File::open(source)
            .map_err(|e| AnagramError::source_unreadable(source, e.to_string()))?;
        let mut reader = BufReader::new(file);

        fs::create_dir_all(workspace.dir())
            .stage(Stage::Partition, || format!("creating {}", workspace.dir().display()))?;

        let mut partitions = Vec::new();
        let mut current = PartitionWriter::open(workspace, ids.allocate())?;
        let mut total_lines = 0u64;
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader.read_line(&mut line).map_err(|e| {
                if e.kind() == io::ErrorKind::InvalidData {
                    AnagramError::source_unreadable(source, format!("not valid UTF-8 text: {}", e))
                } else {
                    AnagramError::io(Stage::Partition, format!("reading {}", source.display()), e)
                }
            })?;
            if read == 0 {
                break;
            }

            if current.lines == self.max_lines {
                partitions.push(current.finish()?);
                current = PartitionWriter::open(workspace, ids.allocate())?;
            }

            current.write_line(trim_newline(&line))?;
            total_lines += 1;

            if total_lines % CHECKPOINT_INTERVAL as u64 == 0 {
                control.checkpoint(Stage::Partition)?;
            }
        }
        partitions.push(current.finish()?);

        tracing::debug!(
            source = %source.display(),
            partitions = partitions.len(),
            lines = total_lines,
            "source partitioned"
        );

        Ok(PartitionSet {
            ids: partitions,
            lines: total_lines,
        })
    }
}

struct PartitionWriter {
    id: FileId,
    path: std::path::PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl PartitionWriter {
    fn open(workspace: &RunWorkspace, id: FileId) -> Result<Self, AnagramError> {
        let path = workspace.file_path(id);
        let file = File::create(&path)
            .stage(Stage::Partition, || format!("creating partition {}", path.display()))?;
        Ok(Self {
            id,
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    fn write_line(&mut self, line: &str) -> Result<(), AnagramError> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .stage(Stage::Partition, || format!("writing partition {}", self.path.display()))?;
        self.lines += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<FileId, AnagramError> {
        self.writer
            .flush()
            .stage(Stage::Partition, || format!("flushing partition {}", self.path.display()))?;
        Ok(self.id)
    }
}

fn trim_newline(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
