// Wire models for the remote content API
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A selectable UI language, as served by `GET /languages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub native_name: String,
    #[serde(default)]
    pub flag_emoji: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub order: i32,
}

/// Per-language content attached to one tour stop.
///
/// `audio_url` may be empty or absent, meaning no narration is available
/// for this language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub language_code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub audio_url: String,
}

/// A point of interest on the tour, with its ordered translations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourStop {
    pub id: String,
    pub stop_number: u32,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub translations: Vec<Translation>,
    #[serde(default)]
    pub duration_seconds: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Singleton site configuration fetched once per launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub default_hero_image: String,
    #[serde(default)]
    pub logo_url: String,
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub site_subtitle: String,
    #[serde(default)]
    pub welcome_description: String,
}

/// Per-language welcome content, fetched on every language change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasilicaInfo {
    #[serde(default)]
    pub id: String,
    pub language_code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// The bundle produced by the launch load: three independent fetches
/// resolved together.
#[derive(Debug, Clone, Serialize)]
pub struct TourContent {
    pub languages: Vec<Language>,
    pub stops: Vec<TourStop>,
    pub site_settings: SiteSettings,
    /// Sum of the stop duration estimates, for the "about N minutes" line.
    pub total_duration_seconds: u32,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminSession {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Error body the API returns on rejected requests, e.g. bad credentials.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_defaults() {
        let lang: Language =
            serde_json::from_str(r#"{"code": "sk", "name": "Slovak"}"#).unwrap();
        assert!(lang.is_active);
        assert_eq!(lang.order, 0);
        assert_eq!(lang.native_name, "");
    }

    #[test]
    fn test_translation_missing_audio_is_empty() {
        let t: Translation = serde_json::from_str(
            r#"{"language_code": "en", "title": "The Nave"}"#,
        )
        .unwrap();
        assert!(t.audio_url.is_empty());
    }

    #[test]
    fn test_tour_stop_round_fields() {
        let json = r#"{
            "id": "stop-1",
            "stop_number": 1,
            "image_url": "/uploads/images/nave.jpg",
            "duration_seconds": 180,
            "is_active": true,
            "translations": [
                {"language_code": "sk", "title": "Lod", "description": "...", "audio_url": "/uploads/audio/sk-1.mp3"},
                {"language_code": "en", "title": "The Nave", "description": "...", "audio_url": "/uploads/audio/en-1.mp3"}
            ]
        }"#;
        let stop: TourStop = serde_json::from_str(json).unwrap();
        assert_eq!(stop.stop_number, 1);
        assert_eq!(stop.translations.len(), 2);
        assert_eq!(stop.translations[1].language_code, "en");
    }

    #[test]
    fn test_error_body_tolerates_unknown_shape() {
        let body: ApiErrorBody = serde_json::from_str(r#"{"something": 1}"#).unwrap();
        assert!(body.detail.is_none());
    }
}
