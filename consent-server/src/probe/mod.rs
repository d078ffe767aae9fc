//! Browser probe: loads a page in headless Chrome and records every
//! outbound request URL in arrival order.
//!
//! The rest of the server only sees the `BrowserProbe` trait, so handlers
//! and the CLI can be exercised against a fake in tests.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use consent_core::CapturedRequest;

pub mod cdp;
pub mod chrome;
pub mod network;

pub use chrome::ChromeProbe;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejected target URL. Raised before any browser is started.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("URL is required")]
    Missing,
    #[error("Invalid URL format: {0}")]
    Invalid(String),
}

/// The probe could not produce a request list.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Launch(String),
    #[error("{0}")]
    Navigation(String),
    #[error("timed out after {0}s waiting for the page to go network-idle")]
    Timeout(u64),
    #[error("devtools protocol error: {0}")]
    Protocol(String),
    #[error("devtools connection error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Whether the browser never came up (as opposed to the page failing).
    pub fn is_launch(&self) -> bool {
        matches!(self, ProbeError::Launch(_))
    }
}

// ---------------------------------------------------------------------------
// Probe trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrowserProbe: Send + Sync {
    /// Navigate to `target` and return the requests observed from navigation
    /// start through the settle window, in arrival order.
    async fn capture(&self, target: &Url) -> Result<Vec<CapturedRequest>, ProbeError>;
}

/// Validate a user-supplied target. Only absolute http(s) URLs with a host
/// are probed.
pub fn validate_target(raw: Option<&str>) -> Result<Url, TargetError> {
    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Err(TargetError::Missing);
    }

    let url = Url::parse(raw).map_err(|e| TargetError::Invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TargetError::Invalid(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(TargetError::Invalid("missing host".into()));
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
