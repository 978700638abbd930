// UI and formatting module

pub mod formatters;
pub mod prompts;

// Re-export commonly used items for cleaner imports
pub use formatters::{format_age, format_state, format_status, format_summary, format_time, print_snapshot};
pub use prompts::{confirm, dimmed, info, success, warn};
