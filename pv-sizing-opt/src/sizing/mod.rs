pub mod balance;
pub mod config;
pub mod horizon;
pub mod indicators;
pub mod optimizer;
pub mod plot;
pub mod production;
pub mod report;

pub use config::SizingConfig;
pub use optimizer::{ConfigurationOptimizer, size_from_store, size_installation};
pub use report::SizingReport;
