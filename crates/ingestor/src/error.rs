use backon::{ExponentialBuilder, Retryable};
use std::{future::Future, time::Duration};
use thiserror::Error;
use tracing::warn;

pub type Result<T> = std::result::Result<T, FetchError>;

/// Failure of a single upstream source.
///
/// Clone is required so a single-flight cache can hand the same failure to
/// every waiter of the in-flight fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed upstream payload: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Transport(_) => true,
            FetchError::Upstream { status, .. } => *status >= 500 || *status == 429,
            FetchError::Decode(_) | FetchError::Configuration(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Retries transient upstream failures with exponential backoff.
///
/// The backoff is bounded so a retried call still fits inside the
/// coordinator's per-source timeout.
pub async fn fetch_with_retry<F, Fut, T>(operation: F, label: &'static str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut op = operation;
    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(2)
        .with_jitter();

    (move || op())
        .retry(backoff)
        .when(FetchError::is_transient)
        .notify(|err: &FetchError, delay: Duration| {
            warn!(retry_in = ?delay, error = %err, operation = label, "transient upstream failure");
        })
        .await
}
