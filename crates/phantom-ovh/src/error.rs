use thiserror::Error;

#[derive(Debug, Error)]
pub enum OvhError {
    /// Credentials are absent from the settings document.
    #[error("OVH API credentials are not configured")]
    MissingCredentials,

    #[error("unknown OVH endpoint '{0}', expected ovh-eu, ovh-ca or ovh-us")]
    UnknownEndpoint(String),

    /// 404 from the API. Kept separate because several callers treat it as
    /// a legitimate "nothing there" signal rather than a failure.
    #[error("resource not found")]
    NotFound,

    #[error("OVH API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

impl OvhError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
