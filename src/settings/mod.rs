// Settings module
// Durable key-value client state (selected language)

pub mod settings;

pub use settings::{AppSettings, DEFAULT_LANGUAGE};
