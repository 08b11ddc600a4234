// Remote content API module
// Talks JSON over HTTPS to the tour backend

pub mod client;
pub mod error;
pub mod models;

pub use client::ContentClient;
pub use error::ApiError;
