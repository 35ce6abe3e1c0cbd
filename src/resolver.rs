//! Cache-first track-to-media resolution.

use log::debug;

use crate::cache::ResolutionCache;
use crate::catalog::Track;
use crate::error::AppError;
use crate::youtube::VideoSearch;

/// Resolves a track to a media ID, consulting the cache before the search
/// boundary. The caller decides when a network resolution is persisted back
/// into the cache (only fully played or manually overridden tracks are).
pub fn resolve_media(
    cache: &ResolutionCache,
    search: &dyn VideoSearch,
    track: &Track,
) -> Result<String, AppError> {
    let identity = track.identity();
    if let Some(media_id) = cache.resolve(&identity) {
        debug!("Cache hit for {}: {}", identity, media_id);
        return Ok(media_id.to_string());
    }
    search.search(&identity)
}
