//! Local and remote service adapters: config files, asset directories, HTTP analysis and result storage.
#![forbid(unsafe_code)]

mod analysis;
pub mod config;
mod fetch;
mod generate;
pub mod image;
mod storage;

pub use analysis::HttpWindAnalysis;
pub use config::{AeolusConfig, ConfigError, load_config, parse_config};
pub use fetch::{DirectoryFetch, format_of};
pub use generate::BoxGenerator;
pub use storage::{DirectoryStorage, RESULTS_FILE};
