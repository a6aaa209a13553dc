use crate::error::{AnagramError, IoContext, Stage};
use crate::signature::{self, Signature};
use crate::worker_pool::{CHECKPOINT_INTERVAL, RunControl};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// How a driver line finds its partner group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Rescan the partner file from its start for every driver line
    NestedScan,
    /// Index the partner's signatures to byte offsets once per pass
    #[default]
    Indexed,
}

/// What one pair merge wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Groups present in both inputs, written once with their words unioned
    pub merged: u64,
    /// Groups only in the first input
    pub kept_first: u64,
    /// Groups only in the second input
    pub kept_second: u64,
}

impl MergeStats {
    pub fn groups(&self) -> u64 {
        self.merged + self.kept_first + self.kept_second
    }
}

pub struct PairMerger {
    strategy: MergeStrategy,
}

impl PairMerger {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self { strategy }
    }

    /// Merges two grouped files into `output`, then deletes both inputs.
    ///
    /// The first pass drives over `first`: matched groups are written unioned,
    /// unmatched ones as they are. The second pass drives over `second` and only
    /// writes the groups the first pass never saw. `output` must not exist yet.
    pub fn merge(
        &self,
        first: &Path,
        second: &Path,
        output: &Path,
        control: &RunControl,
    ) -> Result<MergeStats, AnagramError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(output)
            .stage(Stage::Merge, || format!("creating {}", output.display()))?;
        let mut out = GroupWriter {
            path: output,
            writer: BufWriter::new(file),
        };

        let mut stats = MergeStats::default();
        match self.strategy {
            MergeStrategy::NestedScan => {
                let mut partner = ScanPartner::open(second, control)?;
                write_pass(first, &mut partner, &mut out, true, control, &mut stats)?;
                let mut partner = ScanPartner::open(first, control)?;
                write_pass(second, &mut partner, &mut out, false, control, &mut stats)?;
            }
            MergeStrategy::Indexed => {
                let mut partner = IndexedPartner::build(second, control)?;
                write_pass(first, &mut partner, &mut out, true, control, &mut stats)?;
                let mut partner = IndexedPartner::build(first, control)?;
                write_pass(second, &mut partner, &mut out, false, control, &mut stats)?;
            }
        }
        out.finish()?;

        for input in [first, second] {
            fs::remove_file(input).stage(Stage::Merge, || format!("removing {}", input.display()))?;
        }

        Ok(stats)
    }
}

/// Finds the first group of a partner file carrying a signature
trait PartnerLookup {
    fn find(&mut self, signature: &Signature) -> Result<Option<String>, AnagramError>;

    fn contains(&mut self, signature: &Signature) -> Result<bool, AnagramError> {
        Ok(self.find(signature)?.is_some())
    }
}

/// Rescans the partner from the top on every lookup. Lines read are counted
/// across lookups so long rescans still reach a checkpoint.
struct ScanPartner<'a> {
    path: PathBuf,
    reader: BufReader<File>,
    control: &'a RunControl,
    scanned: usize,
}

impl<'a> ScanPartner<'a> {
    fn open(path: &Path, control: &'a RunControl) -> Result<Self, AnagramError> {
        let file = File::open(path).stage(Stage::Merge, || format!("opening {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            control,
            scanned: 0,
        })
    }
}

impl PartnerLookup for ScanPartner<'_> {
    fn find(&mut self, signature: &Signature) -> Result<Option<String>, AnagramError> {
        self.reader
            .seek(SeekFrom::Start(0))
            .stage(Stage::Merge, || format!("rewinding {}", self.path.display()))?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .stage(Stage::Merge, || format!("scanning {}", self.path.display()))?;
            if read == 0 {
                return Ok(None);
            }
            self.scanned += 1;
            if self.scanned % CHECKPOINT_INTERVAL == 0 {
                self.control.checkpoint(Stage::Merge)?;
            }
            if signature::of_group_line(&line).as_ref() == Some(signature) {
                return Ok(Some(line.trim_end().to_string()));
            }
        }
    }
}

struct IndexedPartner {
    path: PathBuf,
    reader: BufReader<File>,
    offsets: FxHashMap<Signature, u64>,
}

impl IndexedPartner {
    fn build(path: &Path, control: &RunControl) -> Result<Self, AnagramError> {
        let file = File::open(path).stage(Stage::Merge, || format!("opening {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let mut offsets = FxHashMap::default();
        let mut offset = 0u64;
        let mut line = String::new();
        let mut lines = 0usize;

        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .stage(Stage::Merge, || format!("indexing {}", path.display()))?;
            if read == 0 {
                break;
            }
            if let Some(signature) = signature::of_group_line(&line) {
                offsets.entry(signature).or_insert(offset);
            }
            offset += read as u64;
            lines += 1;
            if lines % CHECKPOINT_INTERVAL == 0 {
                control.checkpoint(Stage::Merge)?;
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            offsets,
        })
    }
}

impl PartnerLookup for IndexedPartner {
    fn find(&mut self, signature: &Signature) -> Result<Option<String>, AnagramError> {
        let Some(&offset) = self.offsets.get(signature) else {
            return Ok(None);
        };
        self.reader
            .seek(SeekFrom::Start(offset))
            .stage(Stage::Merge, || format!("seeking {}", self.path.display()))?;
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .stage(Stage::Merge, || format!("reading {}", self.path.display()))?;
        Ok(Some(line.trim_end().to_string()))
    }

    fn contains(&mut self, signature: &Signature) -> Result<bool, AnagramError> {
        Ok(self.offsets.contains_key(signature))
    }
}

struct GroupWriter<'a> {
    path: &'a Path,
    writer: BufWriter<File>,
}

impl GroupWriter<'_> {
    fn write_group<'w, I>(&mut self, words: I) -> Result<(), AnagramError>
    where
        I: IntoIterator<Item = &'w str>,
    {
        let line = signature::format_group(words);
        writeln!(self.writer, "{}", line).stage(Stage::Merge, || format!("writing {}", self.path.display()))
    }

    fn finish(mut self) -> Result<(), AnagramError> {
        self.writer
            .flush()
            .and_then(|_| self.writer.get_ref().sync_all())
            .stage(Stage::Merge, || format!("flushing {}", self.path.display()))
    }
}

/// One pass over `driver`. With `emit_matched` a matched group is written
/// unioned with its partner; without it a matched group is skipped because the
/// other pass already wrote it.
fn write_pass<P: PartnerLookup>(
    driver: &Path,
    partner: &mut P,
    out: &mut GroupWriter<'_>,
    emit_matched: bool,
    control: &RunControl,
    stats: &mut MergeStats,
) -> Result<(), AnagramError> {
    let file = File::open(driver).stage(Stage::Merge, || format!("opening {}", driver.display()))?;
    let reader = BufReader::new(file);

    for (index, line) in reader.lines().enumerate() {
        let line = line.stage(Stage::Merge, || format!("reading {}", driver.display()))?;
        if (index + 1) % CHECKPOINT_INTERVAL == 0 {
            control.checkpoint(Stage::Merge)?;
        }
        let Some(signature) = signature::of_group_line(&line) else {
            continue;
        };

        if emit_matched {
            match partner.find(&signature)? {
                Some(partner_line) => {
                    out.write_group(union_words(&line, &partner_line))?;
                    stats.merged += 1;
                }
                None => {
                    out.write_group(signature::words(&line))?;
                    stats.kept_first += 1;
                }
            }
        } else if !partner.contains(&signature)? {
            out.write_group(signature::words(&line))?;
            stats.kept_second += 1;
        }
    }
    Ok(())
}

/// Words of `a` followed by the words of `b` not already in `a`
fn union_words<'a>(a: &'a str, b: &'a str) -> Vec<&'a str> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    signature::words(a)
        .chain(signature::words(b))
        .filter(|word| seen.insert(*word))
        .collect()
}
