pub mod cli;
pub mod commands;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hashing;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod progress;
pub mod providers;
pub mod sampler;
pub mod scenario;
pub mod stream;
pub mod uploader;
pub mod utils;
pub mod verifier;
