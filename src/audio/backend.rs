// Media backend seam
// The session only ever talks to these traits; the production engine and
// the test backends both live behind them.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no narration audio for this stop")]
    EmptyUrl,

    #[error("failed to fetch audio: {0}")]
    Fetch(String),

    #[error("unsupported or corrupt audio: {0}")]
    Decode(String),

    #[error("audio output unavailable: {0}")]
    Output(String),

    #[error("audio load timed out")]
    Timeout,
}

/// Progress report emitted by a loaded media resource. The backend keeps
/// sending these until the handle is released; `did_finish` may be
/// repeated by a backend, the session deduplicates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    pub did_finish: bool,
}

/// A successfully acquired media resource: the transport handle plus the
/// stream of progress events it emits.
pub struct AcquiredMedia {
    pub handle: Box<dyn MediaHandle>,
    pub events: mpsc::UnboundedReceiver<PlaybackEvent>,
    /// Duration known at acquisition time; 0 when the container does not
    /// report one (the event stream corrects it).
    pub duration_ms: u64,
}

/// Loads one audio resource per call. Acquisition does not start
/// playback; the caller invokes [`MediaHandle::play`].
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn acquire(&self, url: &str) -> Result<AcquiredMedia, AudioError>;
}

/// Transport controls over one loaded resource. All operations are
/// fire-and-forget; progress comes back through the event stream.
/// `release` must be idempotent, and dropping a handle releases it.
pub trait MediaHandle: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek_to(&mut self, position_ms: u64);
    fn release(&mut self);
}
