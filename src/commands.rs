// Tauri command handlers
use chrono::Utc;
use tauri::State;

use crate::api::error::ApiError;
use crate::api::models::{AdminSession, BasilicaInfo, TourContent, TourStop};
use crate::audio::session::PlaybackSnapshot;
use crate::state::AppState;
use crate::tour::{ResolvedStop, StopNeighbors, TourCatalog};

// ===== Content & Language Commands =====

/// The launch load: languages, tour stops and site settings fetched
/// concurrently. All three must resolve; any failure fails the load.
#[tauri::command]
pub async fn load_tour_content(state: State<'_, AppState>) -> Result<TourContent, String> {
    let (languages, stops, site_settings) = tokio::try_join!(
        state.client.get_languages(),
        state.client.get_tour_stops(),
        state.client.get_site_settings(),
    )
    .map_err(|e| format!("Failed to load tour content: {}", e))?;

    let catalog = TourCatalog::new(stops);
    let stops = catalog.stops().to_vec();
    let total_duration_seconds = catalog.total_duration_seconds();
    *state.catalog.lock() = catalog;

    Ok(TourContent {
        languages,
        stops,
        site_settings,
        total_duration_seconds,
        fetched_at: Utc::now(),
    })
}

/// Active stops in touring order, from the last successful load.
#[tauri::command]
pub fn get_tour_stops(state: State<'_, AppState>) -> Result<Vec<TourStop>, String> {
    Ok(state.catalog.lock().stops().to_vec())
}

/// One stop with its translation resolved for the selected language.
/// Unknown ids fail this call only; the caller renders a not-found state.
#[tauri::command]
pub fn get_stop(stop_id: String, state: State<'_, AppState>) -> Result<ResolvedStop, String> {
    let language = state.settings.lock().selected_language.clone();
    state
        .catalog
        .lock()
        .resolve(&stop_id, &language)
        .ok_or_else(|| format!("Stop not found: {}", stop_id))
}

#[tauri::command]
pub fn adjacent_stops(
    stop_id: String,
    state: State<'_, AppState>,
) -> Result<StopNeighbors, String> {
    state
        .catalog
        .lock()
        .neighbors(&stop_id)
        .ok_or_else(|| format!("Stop not found: {}", stop_id))
}

#[tauri::command]
pub async fn get_basilica_info(
    language: String,
    state: State<'_, AppState>,
) -> Result<BasilicaInfo, String> {
    state
        .client
        .get_basilica_info(&language)
        .await
        .map_err(|e| format!("Failed to load basilica info: {}", e))
}

/// Persist the visitor's language and refetch the welcome content for it.
#[tauri::command]
pub async fn select_language(
    code: String,
    state: State<'_, AppState>,
) -> Result<BasilicaInfo, String> {
    {
        let mut settings = state.settings.lock();
        settings.selected_language = code.clone();
        settings.save(&state.app_dir)?;
    }
    state
        .client
        .get_basilica_info(&code)
        .await
        .map_err(|e| format!("Failed to load basilica info: {}", e))
}

#[tauri::command]
pub fn get_selected_language(state: State<'_, AppState>) -> Result<String, String> {
    Ok(state.settings.lock().selected_language.clone())
}

// ===== Admin Commands =====

#[tauri::command]
pub async fn admin_login(
    email: String,
    password: String,
    state: State<'_, AppState>,
) -> Result<AdminSession, String> {
    state
        .client
        .admin_login(&email, &password)
        .await
        .map_err(|e| match e {
            ApiError::Status {
                detail: Some(detail),
                ..
            } => detail,
            _ => "Login failed. Please check your credentials.".to_string(),
        })
}

// ===== Transport Commands =====

/// Start narration for a stop in the selected language, replacing any
/// narration already playing.
#[tauri::command]
pub async fn play_stop(stop_id: String, state: State<'_, AppState>) -> Result<(), String> {
    let audio_url = {
        let language = state.settings.lock().selected_language.clone();
        let catalog = state.catalog.lock();
        let resolved = catalog
            .resolve(&stop_id, &language)
            .ok_or_else(|| format!("Stop not found: {}", stop_id))?;
        if resolved.translation.audio_url.trim().is_empty() {
            return Err("No narration available for this stop".to_string());
        }
        state.client.resolve_media_url(&resolved.translation.audio_url)
    };

    state
        .session
        .play(&stop_id, &audio_url)
        .await
        .map_err(|e| format!("Failed to play narration: {}", e))
}

#[tauri::command]
pub fn pause_playback(state: State<'_, AppState>) -> Result<(), String> {
    state.session.pause();
    Ok(())
}

#[tauri::command]
pub fn resume_playback(state: State<'_, AppState>) -> Result<(), String> {
    state.session.resume();
    Ok(())
}

#[tauri::command]
pub fn stop_playback(state: State<'_, AppState>) -> Result<(), String> {
    state.session.stop();
    Ok(())
}

#[tauri::command]
pub fn seek_playback(position_ms: u64, state: State<'_, AppState>) -> Result<(), String> {
    state.session.seek(position_ms);
    Ok(())
}

#[tauri::command]
pub fn skip_forward(state: State<'_, AppState>) -> Result<(), String> {
    state.session.skip_forward();
    Ok(())
}

#[tauri::command]
pub fn skip_backward(state: State<'_, AppState>) -> Result<(), String> {
    state.session.skip_backward();
    Ok(())
}

#[tauri::command]
pub fn get_playback_status(state: State<'_, AppState>) -> Result<PlaybackSnapshot, String> {
    Ok(state.session.snapshot())
}
