pub mod error;
pub mod general;
pub mod sizing;

// Re-export commonly used items for convenience
pub use error::{Result, SizingError};
pub use sizing::{ConfigurationOptimizer, SizingConfig, SizingReport, size_from_store, size_installation};
