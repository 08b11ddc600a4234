// Tour domain logic
// Ordering, per-language translation resolution and neighbor lookup

use serde::Serialize;

use crate::api::models::{TourStop, Translation};

/// The stops of the tour, filtered to active ones and kept in touring
/// order (`stop_number` ascending). Built once per content load.
#[derive(Debug, Clone, Default)]
pub struct TourCatalog {
    stops: Vec<TourStop>,
}

/// Previous/next stop ids around a given stop. `None` at either end of
/// the tour, which is what disables the corresponding navigation button.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopNeighbors {
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// A stop with its translation already resolved for the UI language.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedStop {
    pub stop: TourStop,
    pub translation: Translation,
    /// Zero-based position in touring order.
    pub index: usize,
    pub total: usize,
}

impl TourCatalog {
    pub fn new(mut stops: Vec<TourStop>) -> Self {
        stops.retain(|s| s.is_active);
        stops.sort_by_key(|s| s.stop_number);
        Self { stops }
    }

    pub fn stops(&self) -> &[TourStop] {
        &self.stops
    }

    fn position(&self, stop_id: &str) -> Option<usize> {
        self.stops.iter().position(|s| s.id == stop_id)
    }

    /// Resolve a stop together with its translation for `language`.
    /// Returns `None` for unknown ids and for stops with no translations
    /// at all.
    pub fn resolve(&self, stop_id: &str, language: &str) -> Option<ResolvedStop> {
        let index = self.position(stop_id)?;
        let stop = &self.stops[index];
        let translation = resolve_translation(stop, language)?;
        Some(ResolvedStop {
            stop: stop.clone(),
            translation: translation.clone(),
            index,
            total: self.stops.len(),
        })
    }

    pub fn neighbors(&self, stop_id: &str) -> Option<StopNeighbors> {
        let index = self.position(stop_id)?;
        let previous = index
            .checked_sub(1)
            .map(|i| self.stops[i].id.clone());
        let next = self.stops.get(index + 1).map(|s| s.id.clone());
        Some(StopNeighbors { previous, next })
    }

    /// Sum of the per-stop duration estimates, in seconds.
    pub fn total_duration_seconds(&self) -> u32 {
        self.stops.iter().map(|s| s.duration_seconds).sum()
    }
}

/// Pick the translation matching `language`, falling back to the stop's
/// first translation. Never fails as long as the stop has any translation.
pub fn resolve_translation<'a>(stop: &'a TourStop, language: &str) -> Option<&'a Translation> {
    stop.translations
        .iter()
        .find(|t| t.language_code == language)
        .or_else(|| stop.translations.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation(code: &str, audio: &str) -> Translation {
        Translation {
            language_code: code.to_string(),
            title: format!("title-{code}"),
            description: String::new(),
            audio_url: audio.to_string(),
        }
    }

    fn stop(id: &str, number: u32, active: bool) -> TourStop {
        TourStop {
            id: id.to_string(),
            stop_number: number,
            image_url: String::new(),
            translations: vec![translation("sk", "/uploads/audio/sk.mp3")],
            duration_seconds: 60,
            is_active: active,
        }
    }

    fn catalog() -> TourCatalog {
        // Deliberately out of order and with one inactive stop.
        TourCatalog::new(vec![
            stop("stop-2", 2, true),
            stop("stop-4", 4, false),
            stop("stop-1", 1, true),
            stop("stop-3", 3, true),
        ])
    }

    #[test]
    fn test_catalog_filters_and_orders() {
        let catalog = catalog();
        let ids: Vec<&str> = catalog.stops().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["stop-1", "stop-2", "stop-3"]);
    }

    #[test]
    fn test_neighbors_in_the_middle() {
        let catalog = catalog();
        let neighbors = catalog.neighbors("stop-2").unwrap();
        assert_eq!(neighbors.previous.as_deref(), Some("stop-1"));
        assert_eq!(neighbors.next.as_deref(), Some("stop-3"));
    }

    #[test]
    fn test_neighbors_at_the_ends() {
        let catalog = catalog();
        let first = catalog.neighbors("stop-1").unwrap();
        assert_eq!(first.previous, None);
        assert_eq!(first.next.as_deref(), Some("stop-2"));

        let last = catalog.neighbors("stop-3").unwrap();
        assert_eq!(last.previous.as_deref(), Some("stop-2"));
        assert_eq!(last.next, None);
    }

    #[test]
    fn test_neighbors_unknown_id() {
        assert_eq!(catalog().neighbors("stop-99"), None);
    }

    #[test]
    fn test_translation_exact_match() {
        let mut s = stop("stop-1", 1, true);
        s.translations.push(translation("en", "/uploads/audio/en.mp3"));
        let t = resolve_translation(&s, "en").unwrap();
        assert_eq!(t.language_code, "en");
    }

    #[test]
    fn test_translation_falls_back_to_first() {
        let s = stop("stop-1", 1, true);
        let t = resolve_translation(&s, "fr").unwrap();
        assert_eq!(t.language_code, "sk");
    }

    #[test]
    fn test_translation_none_when_stop_has_none() {
        let mut s = stop("stop-1", 1, true);
        s.translations.clear();
        assert!(resolve_translation(&s, "sk").is_none());
    }

    #[test]
    fn test_resolve_reports_position() {
        let resolved = catalog().resolve("stop-3", "sk").unwrap();
        assert_eq!(resolved.index, 2);
        assert_eq!(resolved.total, 3);
    }

    #[test]
    fn test_total_duration() {
        assert_eq!(catalog().total_duration_seconds(), 180);
    }
}
