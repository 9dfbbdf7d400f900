pub mod catalog;
pub mod console_display;
pub mod coordinator;
pub mod debouncer;
pub mod detector;
pub mod engine;
pub mod error;
pub mod history;
pub mod pitch_math;
pub mod preferences;
pub mod simulator;
pub mod target_selector;
pub mod types;
