pub mod config;
pub mod eval;
pub mod http;
pub mod lexicon;
pub mod logging;
pub mod model;
pub mod qa;
pub mod registry;
pub mod report;
pub mod runner;
pub mod store;
pub mod tokenizer;

pub use config::Config;
pub use runner::{ProbeRun, RunError};
