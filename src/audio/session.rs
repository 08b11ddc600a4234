// Playback session manager
// Owns the single live media resource and serializes every transport
// operation against it. Screens never touch the handle, only this session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use super::backend::{AudioError, MediaBackend, MediaHandle, PlaybackEvent};

/// Fixed skip increment for the forward/backward transport buttons.
pub const SKIP_INTERVAL_MS: u64 = 15_000;

/// Upper bound on how long a narration file may take to load before the
/// session gives up and reports the failure.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Idle,
    Loading,
    Playing,
    Paused,
}

/// Read-only status pushed to observers on every progress tick and every
/// transport operation. `last_error` carries the most recent load failure
/// so the UI can show it instead of silently doing nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub active_stop_id: Option<String>,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub last_error: Option<String>,
}

struct SessionInner {
    handle: Option<Box<dyn MediaHandle>>,
    state: TransportState,
    active_stop_id: Option<String>,
    position_ms: u64,
    duration_ms: u64,
    last_error: Option<String>,
    /// Token of the most recent `play` (or `stop`). An acquisition that
    /// settles under an older token is stale and gets discarded.
    request_id: u64,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            handle: None,
            state: TransportState::Idle,
            active_stop_id: None,
            position_ms: 0,
            duration_ms: 0,
            last_error: None,
            request_id: 0,
        }
    }

    /// Back to Idle with no resource. The caller is responsible for
    /// releasing any handle it took out first.
    fn reset(&mut self) {
        self.handle = None;
        self.state = TransportState::Idle;
        self.active_stop_id = None;
        self.position_ms = 0;
        self.duration_ms = 0;
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            active_stop_id: self.active_stop_id.clone(),
            is_playing: self.state == TransportState::Playing,
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
            last_error: self.last_error.clone(),
        }
    }
}

pub struct PlaybackSession {
    backend: Arc<dyn MediaBackend>,
    inner: Arc<Mutex<SessionInner>>,
    status_tx: watch::Sender<PlaybackSnapshot>,
    next_request: AtomicU64,
}

impl PlaybackSession {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        let inner = SessionInner::new();
        let (status_tx, _status_rx) = watch::channel(inner.snapshot());
        Self {
            backend,
            inner: Arc::new(Mutex::new(inner)),
            status_tx,
            next_request: AtomicU64::new(0),
        }
    }

    /// Watch the stream of status snapshots. Any number of observers may
    /// subscribe; the channel always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.status_tx.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.lock().snapshot()
    }

    #[cfg(test)]
    fn transport_state(&self) -> TransportState {
        self.inner.lock().state
    }

    fn publish(status_tx: &watch::Sender<PlaybackSnapshot>, inner: &SessionInner) {
        status_tx.send_replace(inner.snapshot());
    }

    /// Load `audio_url` and start playing it for `stop_id`, replacing
    /// whatever was loaded before. A `play` that is overtaken by a newer
    /// `play` or `stop` while the fetch is still in flight releases its
    /// late-arriving resource instead of clobbering the newer state.
    pub async fn play(&self, stop_id: &str, audio_url: &str) -> Result<(), AudioError> {
        if audio_url.trim().is_empty() {
            return Err(AudioError::EmptyUrl);
        }

        let token = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut inner = self.inner.lock();
            inner.request_id = token;
            if let Some(mut old) = inner.handle.take() {
                old.release();
            }
            inner.reset();
            inner.state = TransportState::Loading;
            inner.active_stop_id = Some(stop_id.to_string());
            inner.last_error = None;
            Self::publish(&self.status_tx, &inner);
        }

        let acquired = match tokio::time::timeout(
            ACQUIRE_TIMEOUT,
            self.backend.acquire(audio_url),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AudioError::Timeout),
        };

        match acquired {
            Ok(mut media) => {
                let mut inner = self.inner.lock();
                if inner.request_id != token {
                    // Superseded while loading; the newer request owns the
                    // session now.
                    drop(inner);
                    media.handle.release();
                    return Ok(());
                }
                media.handle.play();
                inner.handle = Some(media.handle);
                inner.state = TransportState::Playing;
                inner.duration_ms = media.duration_ms;
                Self::publish(&self.status_tx, &inner);
                drop(inner);
                self.spawn_event_pump(token, media.events);
                Ok(())
            }
            Err(err) => {
                let mut inner = self.inner.lock();
                if inner.request_id != token {
                    return Ok(());
                }
                eprintln!("[Session] failed to load narration for {stop_id}: {err}");
                inner.reset();
                inner.last_error = Some(err.to_string());
                Self::publish(&self.status_tx, &inner);
                Err(err)
            }
        }
    }

    /// Apply progress events from the loaded resource for as long as the
    /// token is current. Finish is folded into the terminal reset exactly
    /// once, even when the backend repeats the event.
    fn spawn_event_pump(&self, token: u64, mut events: mpsc::UnboundedReceiver<PlaybackEvent>) {
        let inner = Arc::clone(&self.inner);
        let status_tx = self.status_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mut inner = inner.lock();
                if inner.request_id != token || inner.handle.is_none() {
                    break;
                }
                if event.did_finish {
                    if let Some(mut handle) = inner.handle.take() {
                        handle.release();
                    }
                    inner.reset();
                    Self::publish(&status_tx, &inner);
                    break;
                }
                inner.position_ms = event.position_ms;
                if event.duration_ms > 0 {
                    inner.duration_ms = event.duration_ms;
                }
                inner.state = if event.is_playing {
                    TransportState::Playing
                } else {
                    TransportState::Paused
                };
                Self::publish(&status_tx, &inner);
            }
        });
    }

    /// No-op when nothing is loaded.
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.handle.as_mut() else {
            return;
        };
        handle.pause();
        inner.state = TransportState::Paused;
        Self::publish(&self.status_tx, &inner);
    }

    /// No-op when nothing is loaded.
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.handle.as_mut() else {
            return;
        };
        handle.play();
        inner.state = TransportState::Playing;
        Self::publish(&self.status_tx, &inner);
    }

    /// Release the resource unconditionally and return to the initial
    /// state. Idempotent, and also cancels an acquisition still in
    /// flight.
    pub fn stop(&self) {
        let token = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        let mut inner = self.inner.lock();
        inner.request_id = token;
        if let Some(mut handle) = inner.handle.take() {
            handle.release();
        }
        inner.reset();
        inner.last_error = None;
        Self::publish(&self.status_tx, &inner);
    }

    /// Clamp to `[0, duration]` and move the playhead. Does not change
    /// whether playback is running; no-op when nothing is loaded.
    pub fn seek(&self, position_ms: u64) {
        let mut inner = self.inner.lock();
        let clamped = position_ms.min(inner.duration_ms);
        let Some(handle) = inner.handle.as_mut() else {
            return;
        };
        handle.seek_to(clamped);
        inner.position_ms = clamped;
        Self::publish(&self.status_tx, &inner);
    }

    pub fn skip_forward(&self) {
        let target = {
            let inner = self.inner.lock();
            if inner.handle.is_none() {
                return;
            }
            inner.position_ms.saturating_add(SKIP_INTERVAL_MS)
        };
        self.seek(target);
    }

    pub fn skip_backward(&self) {
        let target = {
            let inner = self.inner.lock();
            if inner.handle.is_none() {
                return;
            }
            inner.position_ms.saturating_sub(SKIP_INTERVAL_MS)
        };
        self.seek(target);
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        // Teardown must always be able to let go of the resource.
        let mut inner = self.inner.lock();
        if let Some(mut handle) = inner.handle.take() {
            handle.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::AcquiredMedia;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    struct MockHandle {
        released: Arc<AtomicUsize>,
        done: bool,
    }

    impl MediaHandle for MockHandle {
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn seek_to(&mut self, _position_ms: u64) {}
        fn release(&mut self) {
            if !self.done {
                self.done = true;
                self.released.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    impl Drop for MockHandle {
        fn drop(&mut self) {
            self.release();
        }
    }

    struct ScriptedAcquire {
        gate: Option<oneshot::Receiver<()>>,
        outcome: Result<PreparedMedia, AudioError>,
    }

    struct PreparedMedia {
        duration_ms: u64,
        released: Arc<AtomicUsize>,
        events_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
    }

    /// Test-side view of one scripted resource: release counter plus the
    /// sender feeding its event stream.
    struct MediaProbe {
        released: Arc<AtomicUsize>,
        events: mpsc::UnboundedSender<PlaybackEvent>,
    }

    impl MediaProbe {
        fn release_count(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }

        fn tick(&self, position_ms: u64, duration_ms: u64, is_playing: bool) {
            let _ = self.events.send(PlaybackEvent {
                position_ms,
                duration_ms,
                is_playing,
                did_finish: false,
            });
        }

        fn finish(&self) {
            let _ = self.events.send(PlaybackEvent {
                position_ms: 0,
                duration_ms: 0,
                is_playing: false,
                did_finish: true,
            });
        }
    }

    struct MockBackend {
        script: Mutex<HashMap<String, ScriptedAcquire>>,
    }

    #[async_trait]
    impl MediaBackend for MockBackend {
        async fn acquire(&self, url: &str) -> Result<AcquiredMedia, AudioError> {
            let item = self
                .script
                .lock()
                .remove(url)
                .expect("acquire for a url that was not scripted");
            if let Some(gate) = item.gate {
                let _ = gate.await;
            }
            let media = item.outcome?;
            Ok(AcquiredMedia {
                handle: Box::new(MockHandle {
                    released: media.released,
                    done: false,
                }),
                events: media.events_rx,
                duration_ms: media.duration_ms,
            })
        }
    }

    fn media(url: &str, duration_ms: u64) -> ((String, ScriptedAcquire), MediaProbe) {
        let released = Arc::new(AtomicUsize::new(0));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            (
                url.to_string(),
                ScriptedAcquire {
                    gate: None,
                    outcome: Ok(PreparedMedia {
                        duration_ms,
                        released: Arc::clone(&released),
                        events_rx,
                    }),
                },
            ),
            MediaProbe {
                released,
                events: events_tx,
            },
        )
    }

    fn gated_media(
        url: &str,
        duration_ms: u64,
    ) -> ((String, ScriptedAcquire), MediaProbe, oneshot::Sender<()>) {
        let (open, gate) = oneshot::channel();
        let ((url, mut scripted), probe) = media(url, duration_ms);
        scripted.gate = Some(gate);
        ((url, scripted), probe, open)
    }

    fn failing(url: &str, err: AudioError) -> (String, ScriptedAcquire) {
        (
            url.to_string(),
            ScriptedAcquire {
                gate: None,
                outcome: Err(err),
            },
        )
    }

    fn session_with(script: Vec<(String, ScriptedAcquire)>) -> Arc<PlaybackSession> {
        Arc::new(PlaybackSession::new(Arc::new(MockBackend {
            script: Mutex::new(script.into_iter().collect()),
        })))
    }

    /// Await the first snapshot satisfying `pred`, bounded so a broken
    /// session fails the test instead of hanging it.
    async fn wait_for(
        session: &PlaybackSession,
        pred: impl Fn(&PlaybackSnapshot) -> bool,
    ) -> PlaybackSnapshot {
        let mut rx = session.subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                {
                    let snapshot = rx.borrow_and_update().clone();
                    if pred(&snapshot) {
                        return snapshot;
                    }
                }
                rx.changed().await.expect("session dropped");
            }
        })
        .await
        .expect("snapshot condition not reached in time")
    }

    #[tokio::test]
    async fn test_play_replaces_and_releases_previous_resource() {
        let (first, first_probe) = media("/uploads/audio/en-1.mp3", 30_000);
        let (second, second_probe) = media("/uploads/audio/en-2.mp3", 45_000);
        let session = session_with(vec![first, second]);

        session.play("stop-1", "/uploads/audio/en-1.mp3").await.unwrap();
        assert_eq!(first_probe.release_count(), 0);

        session.play("stop-2", "/uploads/audio/en-2.mp3").await.unwrap();
        assert_eq!(first_probe.release_count(), 1);
        assert_eq!(second_probe.release_count(), 0);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.active_stop_id.as_deref(), Some("stop-2"));
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.duration_ms, 45_000);
    }

    #[tokio::test]
    async fn test_overlapping_play_discards_stale_acquisition() {
        let (slow, slow_probe, open) = gated_media("/uploads/audio/en-1.mp3", 30_000);
        let (fast, fast_probe) = media("/uploads/audio/en-2.mp3", 45_000);
        let session = session_with(vec![slow, fast]);

        let racing = Arc::clone(&session);
        let slow_play = tokio::spawn(async move {
            racing.play("stop-1", "/uploads/audio/en-1.mp3").await
        });
        wait_for(&session, |s| s.active_stop_id.as_deref() == Some("stop-1")).await;

        session.play("stop-2", "/uploads/audio/en-2.mp3").await.unwrap();
        open.send(()).expect("slow acquire already gone");
        slow_play.await.unwrap().unwrap();

        // The late resource was released without ever becoming active.
        assert_eq!(slow_probe.release_count(), 1);
        assert_eq!(fast_probe.release_count(), 0);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.active_stop_id.as_deref(), Some("stop-2"));
        assert!(snapshot.is_playing);
    }

    #[tokio::test]
    async fn test_stop_cancels_acquisition_in_flight() {
        let (slow, slow_probe, open) = gated_media("/uploads/audio/en-1.mp3", 30_000);
        let session = session_with(vec![slow]);

        let racing = Arc::clone(&session);
        let slow_play = tokio::spawn(async move {
            racing.play("stop-1", "/uploads/audio/en-1.mp3").await
        });
        wait_for(&session, |s| s.active_stop_id.as_deref() == Some("stop-1")).await;

        session.stop();
        open.send(()).expect("slow acquire already gone");
        slow_play.await.unwrap().unwrap();

        assert_eq!(slow_probe.release_count(), 1);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.active_stop_id, None);
        assert_eq!(session.transport_state(), TransportState::Idle);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (item, probe) = media("/uploads/audio/en-1.mp3", 30_000);
        let session = session_with(vec![item]);

        // Safe with nothing loaded at all.
        session.stop();

        session.play("stop-1", "/uploads/audio/en-1.mp3").await.unwrap();
        session.stop();
        session.stop();

        assert_eq!(probe.release_count(), 1);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.active_stop_id, None);
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.position_ms, 0);
        assert_eq!(snapshot.duration_ms, 0);
    }

    #[tokio::test]
    async fn test_acquisition_failure_rolls_back_to_idle() {
        let session = session_with(vec![failing(
            "/uploads/audio/en-1.mp3",
            AudioError::Fetch("connection refused".to_string()),
        )]);

        let err = session
            .play("stop-1", "/uploads/audio/en-1.mp3")
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::Fetch(_)));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.active_stop_id, None);
        assert!(!snapshot.is_playing);
        assert_eq!(session.transport_state(), TransportState::Idle);
        assert!(snapshot.last_error.is_some());
    }

    #[tokio::test]
    async fn test_play_rejects_empty_url() {
        let session = session_with(vec![]);
        let err = session.play("stop-1", "   ").await.unwrap_err();
        assert!(matches!(err, AudioError::EmptyUrl));
        assert_eq!(session.transport_state(), TransportState::Idle);
    }

    #[tokio::test]
    async fn test_seek_clamps_and_preserves_playing_flag() {
        let (item, _probe) = media("/uploads/audio/en-1.mp3", 60_000);
        let session = session_with(vec![item]);
        session.play("stop-1", "/uploads/audio/en-1.mp3").await.unwrap();

        session.seek(120_000);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.position_ms, 60_000);
        assert!(snapshot.is_playing);

        session.pause();
        session.seek(1_000);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.position_ms, 1_000);
        assert!(!snapshot.is_playing);
    }

    #[tokio::test]
    async fn test_skip_respects_bounds() {
        let (item, probe) = media("/uploads/audio/en-1.mp3", 60_000);
        let session = session_with(vec![item]);
        session.play("stop-1", "/uploads/audio/en-1.mp3").await.unwrap();

        probe.tick(50_000, 60_000, true);
        wait_for(&session, |s| s.position_ms == 50_000).await;
        session.skip_forward();
        assert_eq!(session.snapshot().position_ms, 60_000);

        probe.tick(10_000, 60_000, true);
        wait_for(&session, |s| s.position_ms == 10_000).await;
        session.skip_backward();
        assert_eq!(session.snapshot().position_ms, 0);
    }

    #[tokio::test]
    async fn test_transport_is_noop_without_resource() {
        let session = session_with(vec![]);
        let before = session.snapshot();

        session.pause();
        session.resume();
        session.seek(5_000);
        session.skip_forward();
        session.skip_backward();

        assert_eq!(session.snapshot(), before);
    }

    #[tokio::test]
    async fn test_pause_resume_cycle() {
        let (item, _probe) = media("/uploads/audio/en-1.mp3", 30_000);
        let session = session_with(vec![item]);
        session.play("stop-1", "/uploads/audio/en-1.mp3").await.unwrap();

        session.pause();
        assert!(!session.snapshot().is_playing);
        assert_eq!(session.transport_state(), TransportState::Paused);

        session.resume();
        assert!(session.snapshot().is_playing);
        assert_eq!(session.transport_state(), TransportState::Playing);
    }

    #[tokio::test]
    async fn test_finish_resets_exactly_once_even_when_repeated() {
        let (item, probe) = media("/uploads/audio/en-1.mp3", 30_000);
        let session = session_with(vec![item]);
        session.play("stop-1", "/uploads/audio/en-1.mp3").await.unwrap();

        probe.finish();
        probe.finish();
        let snapshot = wait_for(&session, |s| s.active_stop_id.is_none()).await;

        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.position_ms, 0);
        assert_eq!(snapshot.duration_ms, 0);
        assert_eq!(probe.release_count(), 1);
        assert_eq!(session.transport_state(), TransportState::Idle);

        // Give the pump a chance to mishandle the duplicate, then confirm
        // the terminal state held.
        tokio::task::yield_now().await;
        assert_eq!(session.snapshot(), snapshot);
        assert_eq!(probe.release_count(), 1);
    }

    #[tokio::test]
    async fn test_progress_ticks_update_snapshot() {
        let (item, probe) = media("/uploads/audio/en-1.mp3", 0);
        let session = session_with(vec![item]);
        session.play("stop-1", "/uploads/audio/en-1.mp3").await.unwrap();

        probe.tick(1_250, 182_000, true);
        let snapshot = wait_for(&session, |s| s.position_ms == 1_250).await;
        assert_eq!(snapshot.duration_ms, 182_000);
        assert_eq!(snapshot.active_stop_id.as_deref(), Some("stop-1"));
    }
}
