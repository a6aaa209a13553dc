use crate::error::{AnagramError, Stage};
use crate::pair_merger::{MergeStats, PairMerger};
use crate::worker_pool::{RunControl, WorkerPool};
use crate::workspace::{FileId, IdAllocator, RunWorkspace};
use std::io;

/// Merge of two files into a freshly allocated one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeTask {
    pub first: FileId,
    pub second: FileId,
    pub output: FileId,
}

/// Odd trailing file moved forward to the next level unmerged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Carry {
    pub from: FileId,
    pub to: FileId,
}

/// One synchronization round of the merge tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeLevel {
    pub tasks: Vec<MergeTask>,
    pub carry: Option<Carry>,
}

impl MergeLevel {
    /// Pairs consecutive ids. Outputs get fresh ids in pair order, the carry last.
    pub fn plan(ids: &[FileId], allocator: &mut IdAllocator) -> Self {
        let tasks = ids
            .chunks_exact(2)
            .map(|pair| MergeTask {
                first: pair[0],
                second: pair[1],
                output: allocator.allocate(),
            })
            .collect();
        let carry = if ids.len() % 2 == 1 {
            ids.last().map(|&from| Carry {
                from,
                to: allocator.allocate(),
            })
        } else {
            None
        };
        Self { tasks, carry }
    }

    /// Ids that survive into the next level
    pub fn outputs(&self) -> Vec<FileId> {
        self.tasks
            .iter()
            .map(|task| task.output)
            .chain(self.carry.map(|carry| carry.to))
            .collect()
    }
}

/// The whole binary merge tree, computed before any file is touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub levels: Vec<MergeLevel>,
    pub root: FileId,
}

impl MergePlan {
    pub fn build(leaves: &[FileId], allocator: &mut IdAllocator) -> Result<Self, AnagramError> {
        if leaves.is_empty() {
            return Err(AnagramError::io(
                Stage::Merge,
                "no partitions to merge",
                io::Error::new(io::ErrorKind::InvalidInput, "empty merge plan"),
            ));
        }

        let mut levels = Vec::new();
        let mut ids = leaves.to_vec();
        while ids.len() > 1 {
            let level = MergeLevel::plan(&ids, allocator);
            ids = level.outputs();
            levels.push(level);
        }

        Ok(Self {
            levels,
            root: ids[0],
        })
    }

    pub fn pair_merges(&self) -> usize {
        self.levels.iter().map(|level| level.tasks.len()).sum()
    }

    pub fn carries(&self) -> usize {
        self.levels.iter().filter(|level| level.carry.is_some()).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    pub levels: usize,
    pub pair_merges: usize,
    pub carried_files: usize,
    /// Groups in the surviving file
    pub groups: u64,
}

/// Runs a merge plan level by level on the worker pool
pub struct MergeScheduler<'a> {
    workspace: &'a RunWorkspace,
    pool: &'a WorkerPool,
    merger: PairMerger,
    control: &'a RunControl,
}

impl<'a> MergeScheduler<'a> {
    pub fn new(
        workspace: &'a RunWorkspace,
        pool: &'a WorkerPool,
        merger: PairMerger,
        control: &'a RunControl,
    ) -> Self {
        Self {
            workspace,
            pool,
            merger,
            control,
        }
    }

    /// Merges `leaves` down to a single file and returns its id.
    ///
    /// A failing level stops the schedule; files it left behind belong to the
    /// workspace and go away with it.
    pub fn merge_all(
        &self,
        leaves: &[FileId],
        allocator: &mut IdAllocator,
    ) -> Result<(FileId, ScheduleStats), AnagramError> {
        let plan = MergePlan::build(leaves, allocator)?;
        let mut stats = ScheduleStats {
            levels: plan.levels.len(),
            pair_merges: plan.pair_merges(),
            carried_files: plan.carries(),
            groups: 0,
        };

        for (depth, level) in plan.levels.iter().enumerate() {
            if let Some(carry) = level.carry {
                self.workspace.rename(carry.from, carry.to)?;
            }

            let merged: Vec<MergeStats> =
                self.pool
                    .run_level(Stage::Merge, &level.tasks, self.control, |task| self.run_task(task))?;

            tracing::debug!(
                level = depth + 1,
                merges = level.tasks.len(),
                carried = level.carry.is_some(),
                groups = merged.iter().map(MergeStats::groups).sum::<u64>(),
                "merge level complete"
            );
            if depth + 1 == plan.levels.len() {
                stats.groups = merged.iter().map(MergeStats::groups).sum();
            }
        }

        Ok((plan.root, stats))
    }

    fn run_task(&self, task: &MergeTask) -> Result<MergeStats, AnagramError> {
        tracing::trace!(first = %task.first, second = %task.second, output = %task.output, "merging pair");
        self.merger.merge(
            &self.workspace.file_path(task.first),
            &self.workspace.file_path(task.second),
            &self.workspace.file_path(task.output),
            self.control,
        )
    }
}
