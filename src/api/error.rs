// Error taxonomy for the content API boundary
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status. `detail` carries the
    /// server-supplied message when the body had one.
    #[error("{}", .detail.as_deref().unwrap_or("server rejected the request"))]
    Status {
        status: u16,
        detail: Option<String>,
    },

    /// The response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Request(err.to_string())
        }
    }
}
