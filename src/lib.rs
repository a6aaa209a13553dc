pub mod config;
pub mod error;
pub mod local_grouper;
pub mod logging;
pub mod output;
pub mod pair_merger;
pub mod partitioner;
pub mod pipeline;
pub mod scheduler;
pub mod signature;
pub mod worker_pool;
pub mod workspace;

pub use config::PipelineConfig;
pub use error::*;
pub use pair_merger::MergeStrategy;
pub use pipeline::{AnagramPipeline, RunReport};
