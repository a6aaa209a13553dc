use crate::error::{AnagramError, IoContext, Stage};
use crate::signature::{self, Signature};
use crate::worker_pool::{CHECKPOINT_INTERVAL, RunControl};
use crate::workspace::{FileId, RunWorkspace};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Counts for one grouped partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub lines: u64,
    pub words: u64,
    pub groups: u64,
}

/// Groups the partition `id` in place
pub fn group_partition(
    workspace: &RunWorkspace,
    id: FileId,
    control: &RunControl,
) -> Result<GroupStats, AnagramError> {
    let stats = group_file(&workspace.file_path(id), control)?;
    tracing::debug!(partition = %id, lines = stats.lines, groups = stats.groups, "partition grouped");
    Ok(stats)
}

/// Rewrites `path` with one line per signature, holding the distinct words
/// found under it. Already-grouped files come out with the same groups.
pub fn group_file(path: &Path, control: &RunControl) -> Result<GroupStats, AnagramError> {
    let file = File::open(path).stage(Stage::LocalGroup, || format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut buckets: FxHashMap<Signature, BTreeSet<String>> = FxHashMap::default();
    let mut stats = GroupStats::default();

    for line in reader.lines() {
        let line = line.stage(Stage::LocalGroup, || format!("reading {}", path.display()))?;
        stats.lines += 1;
        if stats.lines % CHECKPOINT_INTERVAL as u64 == 0 {
            control.checkpoint(Stage::LocalGroup)?;
        }

        for word in signature::words(&line) {
            stats.words += 1;
            let bucket = buckets.entry(signature::of_word(word)).or_default();
            if !bucket.contains(word) {
                bucket.insert(word.to_string());
            }
        }
    }

    let mut groups: Vec<(Signature, BTreeSet<String>)> = buckets.into_iter().collect();
    groups.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    stats.groups = groups.len() as u64;

    let staging = staging_path(path);
    write_groups(&staging, &groups)?;
    fs::rename(&staging, path).stage(Stage::LocalGroup, || format!("replacing {}", path.display()))?;

    Ok(stats)
}

fn write_groups(path: &Path, groups: &[(Signature, BTreeSet<String>)]) -> Result<(), AnagramError> {
    let file = File::create(path).stage(Stage::LocalGroup, || format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for (_, words) in groups {
        let line = signature::format_group(words.iter().map(String::as_str));
        writeln!(writer, "{}", line).stage(Stage::LocalGroup, || format!("writing {}", path.display()))?;
    }
    writer.flush().stage(Stage::LocalGroup, || format!("flushing {}", path.display()))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".grouping");
    path.with_file_name(name)
}
