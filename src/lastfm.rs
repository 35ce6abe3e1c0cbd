//! Last.fm API adapter: top-tracks and loved-tracks pagination plus signed
//! now-playing/scrobble submission.

use std::time::Duration;

use serde_json::Value;

use crate::catalog::{Period, Track};
use crate::error::AppError;

const API_ROOT: &str = "https://ws.audioscrobbler.com/2.0/";
const PAGE_LIMIT: u32 = 1000;

/// One page of ranked top tracks plus the source's pagination metadata.
#[derive(Debug, Clone)]
pub struct TopTracksPage {
    pub tracks: Vec<Track>,
    pub total_pages: u32,
}

/// One page of loved-track identities (`"artist - title"`, original casing).
#[derive(Debug, Clone)]
pub struct LovedTracksPage {
    pub identities: Vec<String>,
    pub total_pages: u32,
}

/// Interface over the scrobble source consumed by the catalog builder,
/// loved-track index, and session reporter.
pub trait ScrobbleService: Send + Sync {
    fn top_tracks_page(
        &self,
        user: &str,
        period: Period,
        page: u32,
    ) -> Result<TopTracksPage, AppError>;
    fn loved_tracks_page(&self, user: &str, page: u32) -> Result<LovedTracksPage, AppError>;
    fn update_now_playing(&self, track: &Track) -> Result<(), AppError>;
    fn scrobble(&self, track: &Track, timestamp: u64) -> Result<(), AppError>;
}

/// Credentials for the scrobble source. All fields are opaque strings
/// supplied by configuration.
#[derive(Debug, Clone)]
pub struct LastfmCredentials {
    pub api_key: String,
    pub shared_secret: String,
    pub session_key: String,
}

/// Last.fm adapter backed by `ureq`.
pub struct LastfmClient {
    http_client: ureq::Agent,
    credentials: LastfmCredentials,
}

impl LastfmClient {
    /// Creates a new Last.fm adapter.
    pub fn new(credentials: LastfmCredentials) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            credentials,
        }
    }

    fn api_url(params: &[(String, String)]) -> String {
        let query_parts: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect();
        format!("{}?{}", API_ROOT, query_parts.join("&"))
    }

    fn request_json(
        &self,
        method: &str,
        params: &[(String, String)],
        post: bool,
    ) -> Result<Value, AppError> {
        let url = Self::api_url(params);
        let request = if post {
            self.http_client.post(&url)
        } else {
            self.http_client.get(&url)
        };
        // Error payloads arrive with non-2xx statuses; read the body anyway.
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => {
                return Err(AppError::Transport(format!(
                    "Last.fm request failed ({method}): {err}"
                )))
            }
        };
        let parsed: Value = response.into_json().map_err(|err| {
            AppError::Parse(format!("Last.fm response parse failed ({method}): {err}"))
        })?;
        if parsed.get("error").is_some() {
            let message = parsed
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Last.fm returned an error");
            return Err(AppError::SourceApi(message.to_string()));
        }
        Ok(parsed)
    }

    fn signed_params(&self, mut params: Vec<(String, String)>) -> Vec<(String, String)> {
        let signature = sign(&params, &self.credentials.shared_secret);
        params.push(("api_sig".to_string(), signature));
        params.push(("format".to_string(), "json".to_string()));
        params
    }
}

/// Canonical concatenation the signature is computed over: every parameter
/// except `format`, sorted by name, as `namevalue` pairs, followed by the
/// shared secret.
fn signature_base(params: &[(String, String)], shared_secret: &str) -> String {
    let mut sorted: Vec<&(String, String)> =
        params.iter().filter(|(key, _)| key != "format").collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut base = String::new();
    for (key, value) in sorted {
        base.push_str(key);
        base.push_str(value);
    }
    base.push_str(shared_secret);
    base
}

fn sign(params: &[(String, String)], shared_secret: &str) -> String {
    format!("{:x}", md5::compute(signature_base(params, shared_secret)))
}

fn array_or_single(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item @ Value::Object(_)) => vec![item],
        _ => Vec::new(),
    }
}

/// Reads a numeric field the source may deliver as either a string or a
/// number. Entries without a usable value are skipped by the callers.
fn value_as_u32(value: Option<&Value>) -> Option<u32> {
    match value {
        Some(Value::String(text)) => text.trim().parse().ok(),
        Some(value) => value.as_u64().and_then(|number| u32::try_from(number).ok()),
        None => None,
    }
}

fn parse_top_track(entry: &Value) -> Option<Track> {
    let artist = entry.get("artist")?.get("name")?.as_str()?.to_string();
    let title = entry.get("name")?.as_str()?.to_string();
    let play_count = value_as_u32(entry.get("playcount"))?;
    let rank = value_as_u32(entry.get("@attr").and_then(|attr| attr.get("rank")))?;
    Some(Track {
        artist,
        title,
        play_count,
        rank,
    })
}

fn parse_total_pages(attr: Option<&Value>) -> u32 {
    value_as_u32(attr.and_then(|attr| attr.get("totalPages"))).unwrap_or(1).max(1)
}

/// Extracts one top-tracks page from a response payload.
fn parse_top_tracks_payload(payload: &Value) -> Result<TopTracksPage, AppError> {
    let toptracks = payload
        .get("toptracks")
        .ok_or_else(|| AppError::Parse("top-tracks payload missing 'toptracks'".to_string()))?;
    let tracks = array_or_single(toptracks.get("track"))
        .into_iter()
        .filter_map(parse_top_track)
        .collect();
    Ok(TopTracksPage {
        tracks,
        total_pages: parse_total_pages(toptracks.get("@attr")),
    })
}

/// Extracts one loved-tracks page from a response payload.
fn parse_loved_tracks_payload(payload: &Value) -> Result<LovedTracksPage, AppError> {
    let lovedtracks = payload
        .get("lovedtracks")
        .ok_or_else(|| AppError::Parse("loved-tracks payload missing 'lovedtracks'".to_string()))?;
    let identities = array_or_single(lovedtracks.get("track"))
        .into_iter()
        .filter_map(|entry| {
            let artist = entry.get("artist")?.get("name")?.as_str()?;
            let title = entry.get("name")?.as_str()?;
            Some(format!("{artist} - {title}"))
        })
        .collect();
    Ok(LovedTracksPage {
        identities,
        total_pages: parse_total_pages(lovedtracks.get("@attr")),
    })
}

impl ScrobbleService for LastfmClient {
    fn top_tracks_page(
        &self,
        user: &str,
        period: Period,
        page: u32,
    ) -> Result<TopTracksPage, AppError> {
        let params = vec![
            ("method".to_string(), "user.gettoptracks".to_string()),
            ("user".to_string(), user.to_string()),
            ("api_key".to_string(), self.credentials.api_key.clone()),
            ("format".to_string(), "json".to_string()),
            ("limit".to_string(), PAGE_LIMIT.to_string()),
            ("period".to_string(), period.wire_value().to_string()),
            ("page".to_string(), page.to_string()),
        ];
        let payload = self.request_json("user.gettoptracks", &params, false)?;
        parse_top_tracks_payload(&payload)
    }

    fn loved_tracks_page(&self, user: &str, page: u32) -> Result<LovedTracksPage, AppError> {
        let params = vec![
            ("method".to_string(), "user.getlovedtracks".to_string()),
            ("user".to_string(), user.to_string()),
            ("api_key".to_string(), self.credentials.api_key.clone()),
            ("format".to_string(), "json".to_string()),
            ("limit".to_string(), PAGE_LIMIT.to_string()),
            ("page".to_string(), page.to_string()),
        ];
        let payload = self.request_json("user.getlovedtracks", &params, false)?;
        parse_loved_tracks_payload(&payload)
    }

    fn update_now_playing(&self, track: &Track) -> Result<(), AppError> {
        let params = self.signed_params(vec![
            ("api_key".to_string(), self.credentials.api_key.clone()),
            ("artist".to_string(), track.artist.clone()),
            ("method".to_string(), "track.updateNowPlaying".to_string()),
            ("sk".to_string(), self.credentials.session_key.clone()),
            ("track".to_string(), track.title.clone()),
        ]);
        let _ = self.request_json("track.updateNowPlaying", &params, true)?;
        Ok(())
    }

    fn scrobble(&self, track: &Track, timestamp: u64) -> Result<(), AppError> {
        let params = self.signed_params(vec![
            ("api_key".to_string(), self.credentials.api_key.clone()),
            ("artist".to_string(), track.artist.clone()),
            ("method".to_string(), "track.scrobble".to_string()),
            ("sk".to_string(), self.credentials.session_key.clone()),
            ("timestamp".to_string(), timestamp.to_string()),
            ("track".to_string(), track.title.clone()),
        ]);
        let _ = self.request_json("track.scrobble", &params, true)?;
        Ok(())
    }
}
