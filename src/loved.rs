//! Loved-track membership index, used only for display decoration.

use std::collections::HashSet;

use log::{info, warn};

use crate::lastfm::ScrobbleService;

/// Pages through the favorites endpoint and accumulates lowercase
/// `"artist - title"` keys. Never fails: an error yields whatever was
/// accumulated so far, possibly nothing, with a warning.
pub fn build_loved_index(service: &dyn ScrobbleService, user: &str) -> HashSet<String> {
    let mut loved = HashSet::new();
    let mut page = 1;
    loop {
        let fetched = match service.loved_tracks_page(user, page) {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!("Loved-track fetch failed on page {}: {}", page, err);
                break;
            }
        };
        if fetched.identities.is_empty() {
            break;
        }
        for identity in fetched.identities {
            loved.insert(identity.to_lowercase());
        }
        if page >= fetched.total_pages {
            break;
        }
        page += 1;
    }
    info!("Loved-track index holds {} entries", loved.len());
    loved
}
