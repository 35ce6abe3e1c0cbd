//! Error taxonomy shared across session components.

use thiserror::Error;

/// Failures surfaced by the catalog builder, resolver, reporter, and cache.
#[derive(Debug, Error)]
pub enum AppError {
    /// The remote service returned an explicit error payload.
    #[error("remote service error: {0}")]
    SourceApi(String),
    /// No track satisfied the play-count filter.
    #[error("no tracks matched the requested filter")]
    EmptyResult,
    /// The media search returned zero results.
    #[error("no media found for \"{0}\"")]
    NoResult(String),
    /// A snapshot or response payload had an unexpected shape.
    #[error("parse error: {0}")]
    Parse(String),
    /// The request never produced a usable response.
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
