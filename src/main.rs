use anagram_search::{AnagramError, AnagramPipeline, MergeStrategy, PipelineConfig, logging};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "anagram_search")]
#[command(about = "Group the anagrams of a large word file using bounded-memory partitions", long_about = None)]
struct Cli {
    /// Text file to process
    source: PathBuf,

    /// Lines per partition [env: ANAGRAM_MAX_LINES]
    #[arg(long)]
    max_lines: Option<usize>,

    /// Worker threads [env: ANAGRAM_WORKERS]
    #[arg(long)]
    workers: Option<usize>,

    /// Accepted file extension, e.g. ".txt" [env: ANAGRAM_EXTENSION]
    #[arg(long)]
    extension: Option<String>,

    /// Where result files go [env: ANAGRAM_OUTPUT_DIR]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Parent of the per-run working directories [env: ANAGRAM_TEMP_DIR]
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Abort the run after this many seconds [env: ANAGRAM_TIMEOUT_SECS]
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long, value_enum, default_value_t = Strategy::Indexed)]
    strategy: Strategy,

    /// Print the run report as JSON instead of the bare output path
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Nested,
    Indexed,
}

impl From<Strategy> for MergeStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Nested => MergeStrategy::NestedScan,
            Strategy::Indexed => MergeStrategy::Indexed,
        }
    }
}

fn build_config(cli: &Cli) -> Result<PipelineConfig, AnagramError> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(max_lines) = cli.max_lines {
        config = config.with_max_lines_per_partition(max_lines);
    }
    if let Some(workers) = cli.workers {
        config = config.with_worker_pool_size(workers);
    }
    if let Some(extension) = &cli.extension {
        config = config.with_file_extension(extension.clone());
    }
    if let Some(output_dir) = &cli.output_dir {
        config = config.with_output_dir(output_dir.clone());
    }
    if let Some(temp_dir) = &cli.temp_dir {
        config = config.with_temp_root(temp_dir.clone());
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_timeout(Some(Duration::from_secs(secs)));
    }
    config = config.with_merge_strategy(cli.strategy.into());
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<String, AnagramError> {
    let config = build_config(cli)?;
    config.log_summary();

    let pipeline = AnagramPipeline::new(config)?;
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, pipeline.cancel_handle()) {
            tracing::warn!(signal, error = %e, "could not install signal handler");
        }
    }

    let report = pipeline.process_with_report(&cli.source)?;
    if cli.json {
        serde_json::to_string_pretty(&report)
            .map_err(|e| AnagramError::Config(format!("cannot render report: {}", e)))
    } else {
        Ok(report.output_path.display().to_string())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    match run(&cli) {
        Ok(line) => {
            println!("{}", line);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code().clamp(1, 255) as u8)
        }
    }
}
