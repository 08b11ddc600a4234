// Audio playback module
// Uses Symphonia for decoding and cpal for output

pub mod backend;
pub mod decoder;
pub mod engine;
pub mod output;
pub mod session;

pub use backend::{AudioError, MediaBackend};
pub use engine::EngineBackend;
pub use session::{PlaybackSession, PlaybackSnapshot};
