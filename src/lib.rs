// Basilica Tour - Mobile Audio Guide
// Module declarations
mod api;
mod audio;
mod commands;
mod settings;
mod state;
mod tour;

use std::sync::Arc;

use tauri::{Emitter, Manager};

use api::ContentClient;
use audio::{EngineBackend, PlaybackSession};
use settings::AppSettings;
use state::AppState;

/// Deployed tour backend; override with BASILICA_TOUR_API_URL for local
/// development against another instance.
const DEFAULT_API_BASE_URL: &str = "https://basilika-tour.preview.emergentagent.com/api";

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            // Get app data directory
            let app_dir = app.path().app_data_dir()
                .expect("Failed to get app data directory");

            let settings = match AppSettings::load(&app_dir) {
                Ok(settings) => settings,
                Err(err) => {
                    eprintln!("[Settings] falling back to defaults: {err}");
                    AppSettings::default()
                }
            };

            let base_url = std::env::var("BASILICA_TOUR_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
            let client = ContentClient::new(base_url);

            // One playback session for the whole process; torn down with it.
            let session = Arc::new(PlaybackSession::new(Arc::new(EngineBackend::new())));

            // Bridge status snapshots to the webview so every screen can
            // render the same player state.
            let mut status_rx = session.subscribe();
            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                while status_rx.changed().await.is_ok() {
                    let snapshot = status_rx.borrow_and_update().clone();
                    if let Err(err) = handle.emit("playback-status", snapshot) {
                        eprintln!("[Session] failed to emit status event: {err}");
                    }
                }
            });

            let app_state = AppState::new(session, client, settings, app_dir);
            app.manage(app_state);

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::load_tour_content,
            commands::get_tour_stops,
            commands::get_stop,
            commands::adjacent_stops,
            commands::get_basilica_info,
            commands::select_language,
            commands::get_selected_language,
            commands::admin_login,
            commands::play_stop,
            commands::pause_playback,
            commands::resume_playback,
            commands::stop_playback,
            commands::seek_playback,
            commands::skip_forward,
            commands::skip_backward,
            commands::get_playback_status,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
