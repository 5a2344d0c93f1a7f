pub mod ingest;
pub mod plugins;

pub use plugins::AppState;
