pub mod audit;
pub mod bundle;
pub mod cache;
pub mod config;
pub mod content;
pub mod descriptions;
pub mod errors;
pub mod generate;
pub mod init;
pub mod models;
pub mod notice;
pub mod orchestrator;
pub mod phase;
pub mod revision;
pub mod sequencer;
pub mod session;
pub mod stale;
pub mod storyboard;
pub mod telemetry;
pub mod toonflow_config;
pub mod transport;
pub mod ui;
pub mod util;
