//! Playback session state machine.
//!
//! One actor owns the catalog position, loop flag, and current media ID, and
//! processes bus messages to completion one at a time. The position counter is
//! post-advance: it names the next track to resolve, so the currently playing
//! track sits at `current_index - 1` modulo catalog length.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

use crate::cache::ResolutionCache;
use crate::catalog::{self, Track};
use crate::error::AppError;
use crate::lastfm::ScrobbleService;
use crate::loved;
use crate::player::MediaPlayer;
use crate::protocol::{Message, PlayerMessage, SessionMessage, SessionParams};
use crate::resolver;
use crate::youtube::VideoSearch;

// Manages the playback/scrobbling session
pub struct SessionManager {
    catalog: Vec<Track>,
    loved: HashSet<String>,
    cache: ResolutionCache,
    current_index: usize,
    current_media_id: Option<String>,
    loop_enabled: bool,
    bus_consumer: Receiver<Message>,
    service: Box<dyn ScrobbleService>,
    search: Box<dyn VideoSearch>,
    player: Box<dyn MediaPlayer>,
    bundled_cache_path: Option<PathBuf>,
    local_cache_path: PathBuf,
}

impl SessionManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        service: Box<dyn ScrobbleService>,
        search: Box<dyn VideoSearch>,
        player: Box<dyn MediaPlayer>,
        bundled_cache_path: Option<PathBuf>,
        local_cache_path: PathBuf,
    ) -> Self {
        Self {
            catalog: Vec::new(),
            loved: HashSet::new(),
            cache: ResolutionCache::empty(local_cache_path.clone()),
            current_index: 0,
            current_media_id: None,
            loop_enabled: false,
            bus_consumer,
            service,
            search,
            player,
            bundled_cache_path,
            local_cache_path,
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Session(message)) => {
                    if !self.handle_session_message(message) {
                        break;
                    }
                }
                Ok(Message::Player(PlayerMessage::MediaEnded)) => self.handle_media_ended(),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SessionManager: lagged behind bus, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("SessionManager: exiting");
    }

    /// Returns `false` when the actor should stop.
    fn handle_session_message(&mut self, message: SessionMessage) -> bool {
        match message {
            SessionMessage::Start(params) => self.handle_start(params),
            SessionMessage::Skip => self.handle_skip(),
            SessionMessage::Previous => self.handle_previous(),
            SessionMessage::ScrobbleAndAdvance => self.handle_scrobble_and_advance(),
            SessionMessage::ToggleLoop => self.handle_toggle_loop(),
            SessionMessage::OverrideMedia(media_id) => self.handle_override_media(media_id),
            SessionMessage::ImportCache(path) => self.handle_import_cache(path),
            SessionMessage::ExportCache(path) => self.handle_export_cache(path),
            SessionMessage::Shutdown => return false,
        }
        true
    }

    fn session_active(&self) -> bool {
        !self.catalog.is_empty()
    }

    /// The track occupying the playing slot, one behind the position counter.
    fn playing_track(&self) -> Option<&Track> {
        if self.catalog.is_empty() || self.current_media_id.is_none() {
            return None;
        }
        let playing = (self.current_index + self.catalog.len() - 1) % self.catalog.len();
        self.catalog.get(playing)
    }

    fn handle_start(&mut self, params: SessionParams) {
        if self.session_active() {
            warn!("SessionManager: session already active, ignoring start");
            return;
        }
        info!(
            "Starting session for {} ({}..={} plays, period {})",
            params.user,
            params.min_plays,
            params.max_plays,
            params.period.wire_value()
        );

        // Cache load and loved-index build are independent; run them
        // together and join both before catalog building.
        let bundled_path = self.bundled_cache_path.clone();
        let local_path = self.local_cache_path.clone();
        let service = self.service.as_ref();
        let user = params.user.clone();
        let (cache, loved) = std::thread::scope(|scope| {
            let loved_handle = scope.spawn(move || loved::build_loved_index(service, &user));
            let cache = ResolutionCache::load(bundled_path.as_deref(), local_path);
            let loved = loved_handle.join().unwrap_or_else(|_| {
                warn!("Loved-track index build panicked, continuing without decoration");
                HashSet::new()
            });
            (cache, loved)
        });
        self.cache = cache;
        self.loved = loved;

        match catalog::build_catalog(self.service.as_ref(), &params) {
            Ok(catalog) => {
                self.catalog = catalog;
                self.current_index = 0;
                self.current_media_id = None;
                self.loop_enabled = false;
            }
            Err(err) => {
                // No partial catalog is ever exposed; stay idle.
                error!("Failed to build catalog: {}", err);
                return;
            }
        }

        if let Err(err) = self.advance() {
            error!("Failed to start playback: {}", err);
        }
    }

    /// Normal advance: resolve the track at the position counter, report now
    /// playing, move the counter (wrapping), and hand the media ID to the
    /// player. With loop enabled, re-report and replay the current track
    /// instead; the counter does not move.
    ///
    /// The counter only moves after a successful resolution, so a failed
    /// advance leaves the session retryable at the same target track.
    fn advance(&mut self) -> Result<(), AppError> {
        if self.loop_enabled {
            let Some(track) = self.playing_track().cloned() else {
                return Ok(());
            };
            let Some(media_id) = self.current_media_id.clone() else {
                return Ok(());
            };
            self.report_scrobble(&track);
            self.report_now_playing(&track);
            self.player.load_media(&media_id)?;
            return Ok(());
        }

        let track = self.catalog[self.current_index].clone();
        self.announce(&track);
        let media_id = resolver::resolve_media(&self.cache, self.search.as_ref(), &track)?;
        self.report_now_playing(&track);
        self.current_index = (self.current_index + 1) % self.catalog.len();
        self.current_media_id = Some(media_id.clone());
        self.player.load_media(&media_id)?;
        Ok(())
    }

    /// Natural end of media: only now is the finished track worth caching,
    /// since only a fully played track is scrobbled.
    fn handle_media_ended(&mut self) {
        if !self.session_active() {
            return;
        }
        self.cache_playing_track();
        self.scrobble_playing_track();
        if let Err(err) = self.advance() {
            error!("Advance after track end failed: {}", err);
        }
    }

    /// An explicit skip does not count as a play: no scrobble for the
    /// interrupted track.
    fn handle_skip(&mut self) {
        if !self.session_active() {
            warn!("SessionManager: no session active, ignoring skip");
            return;
        }
        self.loop_enabled = false;
        if let Err(err) = self.advance() {
            error!("Skip failed: {}", err);
        }
    }

    /// "I listened to this, move on": cache and scrobble the current track as
    /// a natural end would, then advance.
    fn handle_scrobble_and_advance(&mut self) {
        if !self.session_active() {
            warn!("SessionManager: no session active, ignoring scrobble");
            return;
        }
        self.loop_enabled = false;
        self.cache_playing_track();
        self.scrobble_playing_track();
        if let Err(err) = self.advance() {
            error!("Advance after scrobble failed: {}", err);
        }
    }

    fn handle_previous(&mut self) {
        if !self.session_active() {
            warn!("SessionManager: no session active, ignoring previous");
            return;
        }
        self.loop_enabled = false;
        let len = self.catalog.len();
        // At the very first track, or with a single-track catalog, there is
        // no distinct prior track to return to.
        if self.current_media_id.is_none() || self.current_index == 1 || len < 2 {
            return;
        }
        self.current_index = (self.current_index + len - 2) % len;
        if let Err(err) = self.advance() {
            error!("Previous failed: {}", err);
        }
    }

    fn handle_toggle_loop(&mut self) {
        self.loop_enabled = !self.loop_enabled;
        info!(
            "Loop {}",
            if self.loop_enabled { "enabled" } else { "disabled" }
        );
    }

    /// A user-supplied media ID for the current track is authoritative: it is
    /// cached immediately and loaded, bypassing resolution. Position and loop
    /// state are untouched.
    fn handle_override_media(&mut self, media_id: String) {
        let Some(track) = self.playing_track().cloned() else {
            warn!("SessionManager: nothing playing, ignoring media override");
            return;
        };
        self.cache.store(&track.identity(), &media_id);
        self.current_media_id = Some(media_id.clone());
        info!("Media for {} overridden to {}", track.identity(), media_id);
        if let Err(err) = self.player.load_media(&media_id) {
            error!("Failed to load overridden media: {}", err);
        }
    }

    fn handle_import_cache(&mut self, path: PathBuf) {
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                error!("Could not read snapshot {}: {}", path.display(), err);
                return;
            }
        };
        match self.cache.import(&text) {
            Ok(count) => info!("Imported {} cache entries from {}", count, path.display()),
            Err(err) => error!("Import of {} failed: {}", path.display(), err),
        }
    }

    fn handle_export_cache(&mut self, path: PathBuf) {
        match self.cache.export_to(&path) {
            Ok(count) => info!("Exported {} cache entries to {}", count, path.display()),
            Err(err) => error!("Export to {} failed: {}", path.display(), err),
        }
    }

    fn cache_playing_track(&mut self) {
        let Some(track) = self.playing_track().cloned() else {
            return;
        };
        let Some(media_id) = self.current_media_id.clone() else {
            return;
        };
        self.cache.store(&track.identity(), &media_id);
    }

    fn scrobble_playing_track(&mut self) {
        let Some(track) = self.playing_track().cloned() else {
            return;
        };
        self.report_scrobble(&track);
    }

    /// Best-effort: failures are logged, never propagated, and never reverse
    /// a committed transition.
    fn report_scrobble(&self, track: &Track) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        if let Err(err) = self.service.scrobble(track, timestamp) {
            warn!("Scrobble submission failed for {}: {}", track.identity(), err);
        }
    }

    /// Best-effort, like [`Self::report_scrobble`].
    fn report_now_playing(&self, track: &Track) {
        if let Err(err) = self.service.update_now_playing(track) {
            warn!(
                "Now-playing update failed for {}: {}",
                track.identity(),
                err
            );
        }
    }

    fn announce(&self, track: &Track) {
        let heart = if self.loved.contains(&track.loved_key()) {
            "\u{2665} "
        } else {
            ""
        };
        info!(
            "#{} | {}{} ({} plays)",
            track.rank,
            heart,
            track.identity(),
            track.play_count
        );
    }

    #[cfg(test)]
    fn current_index(&self) -> usize {
        self.current_index
    }

    #[cfg(test)]
    fn current_media_id(&self) -> Option<&str> {
        self.current_media_id.as_deref()
    }

    #[cfg(test)]
    fn cached_media(&self, identity: &str) -> Option<&str> {
        self.cache.resolve(identity)
    }
}
