use thiserror::Error;

/// Errors surfaced by the coordination core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No live voice session exists for the community.
    #[error("not connected to a voice channel")]
    NotConnected,

    /// A playback is already in flight for the session. Requests are
    /// dropped, never queued.
    #[error("a sound is already playing")]
    AlreadyPlaying,

    /// A file-backed store could not be read, parsed or written.
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The external match-data service failed or returned garbage.
    #[error("external api error: {0}")]
    ExternalApi(String),

    /// The platform rejected a privileged call (e.g. a rename).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A runtime-settable parameter was outside its bounds.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        Self::ExternalApi(e.to_string())
    }
}
