// Command handlers module
pub mod config;
pub mod watch;

// Re-exports for cleaner imports
pub use config::execute as config;
pub use watch::execute as watch;
