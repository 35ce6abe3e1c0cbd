//! Media player boundary.
//!
//! The session hands resolved media IDs to a `MediaPlayer`; end-of-media
//! arrives back on the bus as a `PlayerMessage::MediaEnded`. The default
//! implementation opens the watch URL in the system browser.

use log::info;

use crate::error::AppError;

const WATCH_ROOT: &str = "https://www.youtube.com/watch?v=";

/// Load-by-ID capability consumed by the session actor.
pub trait MediaPlayer: Send + Sync {
    fn load_media(&self, media_id: &str) -> Result<(), AppError>;
}

/// Plays media by opening its watch URL in the system browser.
pub struct BrowserPlayer;

impl MediaPlayer for BrowserPlayer {
    fn load_media(&self, media_id: &str) -> Result<(), AppError> {
        let url = format!("{WATCH_ROOT}{media_id}");
        info!("Opening {}", url);
        webbrowser::open(&url)?;
        Ok(())
    }
}

/// Extracts a media ID from user input: a raw ID, a `youtu.be` short link,
/// or a full watch URL with a `v` query parameter.
pub fn parse_media_input(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Some(rest) = input.split("youtu.be/").nth(1) {
        let id = rest.split(['?', '&', '/']).next().unwrap_or("");
        return if id.is_empty() { None } else { Some(id.to_string()) };
    }
    if let Some(query) = input.split(['?', '&']).find(|part| part.starts_with("v=")) {
        let id = &query[2..];
        return if id.is_empty() { None } else { Some(id.to_string()) };
    }
    if input.contains('/') || input.contains('?') {
        return None;
    }
    Some(input.to_string())
}

#[cfg(test)]
mod tests {
    use super::parse_media_input;

    #[test]
    fn test_raw_id_passes_through() {
        assert_eq!(parse_media_input(" vid123 "), Some("vid123".to_string()));
    }

    #[test]
    fn test_short_link_is_unwrapped() {
        assert_eq!(
            parse_media_input("https://youtu.be/vid123?t=4"),
            Some("vid123".to_string())
        );
    }

    #[test]
    fn test_watch_url_v_parameter_is_extracted() {
        assert_eq!(
            parse_media_input("https://www.youtube.com/watch?v=vid123&list=PL1"),
            Some("vid123".to_string())
        );
    }

    #[test]
    fn test_unusable_input_is_rejected() {
        assert_eq!(parse_media_input(""), None);
        assert_eq!(parse_media_input("https://example.com/nothing"), None);
    }
}
