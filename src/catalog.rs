//! Track model and catalog construction.
//!
//! A catalog is built once per session: ranked top tracks are fetched page by
//! page, filtered to the requested play-count band, and optionally shuffled.

use log::{debug, info};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::AppError;
use crate::lastfm::ScrobbleService;
use crate::protocol::SessionParams;

/// One entry of the session catalog. Immutable after construction; rank and
/// play count are carried through from the source for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub artist: String,
    pub title: String,
    pub play_count: u32,
    pub rank: u32,
}

impl Track {
    /// Composite identity used as the cache key and search query.
    /// Case-sensitive by contract.
    pub fn identity(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }

    /// Lowercased identity used for loved-track membership checks.
    pub fn loved_key(&self) -> String {
        self.identity().to_lowercase()
    }
}

/// Historical window over which the source aggregates play counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    SevenDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    TwelveMonths,
    #[default]
    Overall,
}

impl Period {
    /// The value the scrobble source expects in its `period` parameter.
    pub fn wire_value(self) -> &'static str {
        match self {
            Period::SevenDays => "7day",
            Period::OneMonth => "1month",
            Period::ThreeMonths => "3month",
            Period::SixMonths => "6month",
            Period::TwelveMonths => "12month",
            Period::Overall => "overall",
        }
    }

    /// Parses the wire value, for command-line overrides.
    pub fn parse(value: &str) -> Option<Period> {
        match value {
            "7day" => Some(Period::SevenDays),
            "1month" => Some(Period::OneMonth),
            "3month" => Some(Period::ThreeMonths),
            "6month" => Some(Period::SixMonths),
            "12month" => Some(Period::TwelveMonths),
            "overall" => Some(Period::Overall),
            _ => None,
        }
    }
}

/// Ordering applied to the finished catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogOrder {
    /// Keep the source's rank order (descending play count).
    ByRank,
    /// Unbiased random permutation.
    #[default]
    Random,
}

impl CatalogOrder {
    pub fn parse(value: &str) -> Option<CatalogOrder> {
        match value {
            "rank" | "by_rank" => Some(CatalogOrder::ByRank),
            "random" => Some(CatalogOrder::Random),
            _ => None,
        }
    }
}

/// Builds the session catalog from the scrobble source.
///
/// The source delivers tracks in non-increasing play-count order, so the first
/// play count below `min_plays` ends pagination: no later track can qualify.
/// A track above `max_plays` is skipped without stopping pagination.
pub fn build_catalog(
    service: &dyn ScrobbleService,
    params: &SessionParams,
) -> Result<Vec<Track>, AppError> {
    let mut tracks: Vec<Track> = Vec::new();
    let mut page = 1;
    let mut total_pages = 1;
    let mut floor_reached = false;

    while page <= total_pages && !floor_reached {
        let fetched = service.top_tracks_page(&params.user, params.period, page)?;
        total_pages = fetched.total_pages;
        debug!(
            "Catalog page {}/{}: {} tracks",
            page,
            total_pages,
            fetched.tracks.len()
        );
        for track in fetched.tracks {
            if track.play_count < params.min_plays {
                floor_reached = true;
                break;
            }
            if track.play_count <= params.max_plays {
                tracks.push(track);
            }
        }
        page += 1;
    }

    if tracks.is_empty() {
        return Err(AppError::EmptyResult);
    }

    if params.order == CatalogOrder::Random {
        shuffle_tracks(&mut tracks);
    }
    info!("Built catalog with {} tracks", tracks.len());
    Ok(tracks)
}

fn shuffle_tracks(tracks: &mut [Track]) {
    // Use StdRng instead of ThreadRng for thread safety
    let mut seed = [0u8; 32];
    getrandom::fill(&mut seed).expect("Failed to generate random seed");
    let mut rng = StdRng::from_seed(seed);
    tracks.shuffle(&mut rng);
}

#[cfg(test)]
mod tests {
    use super::{build_catalog, CatalogOrder, Period, Track};
    use crate::error::AppError;
    use crate::lastfm::{LovedTracksPage, ScrobbleService, TopTracksPage};
    use crate::protocol::SessionParams;
    use std::sync::Mutex;

    fn track(artist: &str, title: &str, play_count: u32, rank: u32) -> Track {
        Track {
            artist: artist.to_string(),
            title: title.to_string(),
            play_count,
            rank,
        }
    }

    struct FakeSource {
        pages: Vec<TopTracksPage>,
        pages_served: Mutex<u32>,
    }

    impl FakeSource {
        fn new(pages: Vec<TopTracksPage>) -> FakeSource {
            FakeSource {
                pages,
                pages_served: Mutex::new(0),
            }
        }

        fn served(&self) -> u32 {
            *self.pages_served.lock().unwrap()
        }
    }

    impl ScrobbleService for FakeSource {
        fn top_tracks_page(
            &self,
            _user: &str,
            _period: Period,
            page: u32,
        ) -> Result<TopTracksPage, AppError> {
            *self.pages_served.lock().unwrap() += 1;
            self.pages
                .get((page - 1) as usize)
                .cloned()
                .ok_or_else(|| AppError::SourceApi(format!("no page {}", page)))
        }

        fn loved_tracks_page(&self, _user: &str, _page: u32) -> Result<LovedTracksPage, AppError> {
            unimplemented!("not used by catalog tests")
        }

        fn update_now_playing(&self, _track: &Track) -> Result<(), AppError> {
            unimplemented!("not used by catalog tests")
        }

        fn scrobble(&self, _track: &Track, _timestamp: u64) -> Result<(), AppError> {
            unimplemented!("not used by catalog tests")
        }
    }

    fn params(min_plays: u32, max_plays: u32, order: CatalogOrder) -> SessionParams {
        SessionParams {
            user: "listener".to_string(),
            min_plays,
            max_plays,
            period: Period::Overall,
            order,
        }
    }

    #[test]
    fn test_band_is_inclusive_and_order_preserved_by_rank() {
        let source = FakeSource::new(vec![TopTracksPage {
            tracks: vec![track("A", "a", 100, 1), track("B", "b", 50, 2)],
            total_pages: 1,
        }]);

        let catalog = build_catalog(&source, &params(50, 100, CatalogOrder::ByRank)).unwrap();

        assert_eq!(
            catalog,
            vec![track("A", "a", 100, 1), track("B", "b", 50, 2)]
        );
    }

    #[test]
    fn test_floor_halts_pagination_before_later_pages() {
        let source = FakeSource::new(vec![
            TopTracksPage {
                tracks: vec![track("A", "a", 40, 1), track("B", "b", 10, 2)],
                total_pages: 3,
            },
            TopTracksPage {
                tracks: vec![track("C", "c", 40, 3)],
                total_pages: 3,
            },
        ]);

        let catalog = build_catalog(&source, &params(20, 1000, CatalogOrder::ByRank)).unwrap();

        assert_eq!(catalog, vec![track("A", "a", 40, 1)]);
        assert_eq!(source.served(), 1, "floor must stop further page fetches");
    }

    #[test]
    fn test_ceiling_skips_without_stopping_pagination() {
        let source = FakeSource::new(vec![
            TopTracksPage {
                tracks: vec![track("A", "a", 500, 1), track("B", "b", 90, 2)],
                total_pages: 2,
            },
            TopTracksPage {
                tracks: vec![track("C", "c", 80, 3)],
                total_pages: 2,
            },
        ]);

        let catalog = build_catalog(&source, &params(50, 100, CatalogOrder::ByRank)).unwrap();

        assert_eq!(catalog, vec![track("B", "b", 90, 2), track("C", "c", 80, 3)]);
        assert_eq!(source.served(), 2);
    }

    #[test]
    fn test_empty_catalog_is_an_error() {
        let source = FakeSource::new(vec![TopTracksPage {
            tracks: vec![track("A", "a", 5, 1)],
            total_pages: 1,
        }]);

        let result = build_catalog(&source, &params(10, 100, CatalogOrder::ByRank));

        assert!(matches!(result, Err(AppError::EmptyResult)));
    }

    #[test]
    fn test_source_error_propagates() {
        let source = FakeSource::new(vec![]);

        let result = build_catalog(&source, &params(1, 100, CatalogOrder::ByRank));

        assert!(matches!(result, Err(AppError::SourceApi(_))));
    }

    #[test]
    fn test_random_order_keeps_every_track_exactly_once() {
        let tracks: Vec<Track> = (1..=20)
            .map(|rank| track("A", &format!("t{rank}"), 100, rank))
            .collect();
        let source = FakeSource::new(vec![TopTracksPage {
            tracks: tracks.clone(),
            total_pages: 1,
        }]);

        let mut catalog = build_catalog(&source, &params(1, 1000, CatalogOrder::Random)).unwrap();

        catalog.sort_by_key(|t| t.rank);
        assert_eq!(catalog, tracks);
    }

    #[test]
    fn test_period_wire_values() {
        assert_eq!(Period::SevenDays.wire_value(), "7day");
        assert_eq!(Period::OneMonth.wire_value(), "1month");
        assert_eq!(Period::ThreeMonths.wire_value(), "3month");
        assert_eq!(Period::SixMonths.wire_value(), "6month");
        assert_eq!(Period::TwelveMonths.wire_value(), "12month");
        assert_eq!(Period::Overall.wire_value(), "overall");
        assert_eq!(Period::parse("12month"), Some(Period::TwelveMonths));
        assert_eq!(Period::parse("fortnight"), None);
    }
}
