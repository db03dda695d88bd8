pub mod config;
pub mod edgar;
pub mod loader;
pub mod storage;

// Re-exports
pub use config::ImportConfig;
pub use loader::{FilingLoader, LoadSummary};
