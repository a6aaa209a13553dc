use crate::error::{AnagramError, IoContext, Stage};
use crate::signature;
use crate::worker_pool::{CHECKPOINT_INTERVAL, RunControl};
use crate::workspace::{source_stem, unix_millis};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmitStats {
    pub groups_emitted: u64,
    pub words_emitted: u64,
    pub singletons_dropped: u64,
}

/// Writes every multi-word group of `grouped` to a fresh file in `output_dir`,
/// words sorted, and returns its path.
///
/// The file is named `<stem>_<millis><extension>`, with `_N` appended when the
/// name is already taken. It appears under that name only once complete, and a
/// name is never claimed by two runs.
pub fn emit_groups(
    grouped: &Path,
    output_dir: &Path,
    source: &Path,
    extension: &str,
    control: &RunControl,
) -> Result<(PathBuf, EmitStats), AnagramError> {
    fs::create_dir_all(output_dir).stage(Stage::Emit, || format!("creating {}", output_dir.display()))?;

    let stem = source_stem(source);
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{}_", stem))
        .suffix(".partial")
        .tempfile_in(output_dir)
        .stage(Stage::Emit, || format!("creating staging file in {}", output_dir.display()))?;

    let stats = write_sorted_groups(grouped, &staging, control)?;
    let output = publish(staging, output_dir, &format!("{}_{}", stem, unix_millis()), extension)?;
    Ok((output, stats))
}

/// Moves `staging` to the first free `<base>[_N]<extension>` in `output_dir`
fn publish(
    mut staging: NamedTempFile,
    output_dir: &Path,
    base: &str,
    extension: &str,
) -> Result<PathBuf, AnagramError> {
    let mut attempt = 0usize;
    loop {
        let candidate = if attempt == 0 {
            output_dir.join(format!("{}{}", base, extension))
        } else {
            output_dir.join(format!("{}_{}{}", base, attempt, extension))
        };
        match staging.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                staging = e.file;
                attempt += 1;
            }
            Err(e) => {
                return Err(AnagramError::io(
                    Stage::Emit,
                    format!("publishing {}", candidate.display()),
                    e.error,
                ));
            }
        }
    }
}

fn write_sorted_groups(
    grouped: &Path,
    staging: &NamedTempFile,
    control: &RunControl,
) -> Result<EmitStats, AnagramError> {
    let file = File::open(grouped).stage(Stage::Emit, || format!("opening {}", grouped.display()))?;
    let reader = BufReader::new(file);
    let mut writer = BufWriter::new(staging.as_file());
    let mut stats = EmitStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.stage(Stage::Emit, || format!("reading {}", grouped.display()))?;
        if (index + 1) % CHECKPOINT_INTERVAL == 0 {
            control.checkpoint(Stage::Emit)?;
        }

        let mut words: Vec<&str> = signature::words(&line).collect();
        match words.len() {
            0 => continue,
            1 => {
                stats.singletons_dropped += 1;
                continue;
            }
            n => {
                words.sort_unstable();
                writeln!(writer, "{}", signature::format_group(words))
                    .stage(Stage::Emit, || format!("writing {}", staging.path().display()))?;
                stats.groups_emitted += 1;
                stats.words_emitted += n as u64;
            }
        }
    }

    writer
        .flush()
        .and_then(|_| writer.get_ref().sync_all())
        .stage(Stage::Emit, || format!("flushing {}", staging.path().display()))?;
    Ok(stats)
}
