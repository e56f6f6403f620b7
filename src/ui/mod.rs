// UI and formatting module

pub mod formatters;
pub mod prompts;

// Re-export commonly used items for cleaner imports
pub use formatters::{colorize_cpu, format_sample_line, format_static_info};
pub use prompts::{dimmed, error, info, success, warn};
