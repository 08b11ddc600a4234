// Application state management
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::ContentClient;
use crate::audio::session::PlaybackSession;
use crate::settings::AppSettings;
use crate::tour::TourCatalog;

pub struct AppState {
    pub session: Arc<PlaybackSession>,
    pub client: ContentClient,
    pub catalog: Mutex<TourCatalog>,
    pub settings: Mutex<AppSettings>,
    pub app_dir: PathBuf,
}

impl AppState {
    pub fn new(
        session: Arc<PlaybackSession>,
        client: ContentClient,
        settings: AppSettings,
        app_dir: PathBuf,
    ) -> Self {
        Self {
            session,
            client,
            catalog: Mutex::new(TourCatalog::default()),
            settings: Mutex::new(settings),
            app_dir,
        }
    }
}
