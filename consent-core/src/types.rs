//! Shared types, error enum, and verdict types for consent-core.

use serde::ser::Serializer;
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// All errors produced by consent-core.
///
/// Classification and decoding are total, so only the config layer fails.
#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ConsentError>;

// ---------------------------------------------------------------------------
// Captured traffic
// ---------------------------------------------------------------------------

/// One outbound request URL observed during page load.
///
/// `seq` is the arrival index within the probing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedRequest {
    pub seq: usize,
    pub url: String,
}

impl CapturedRequest {
    pub fn new(seq: usize, url: impl Into<String>) -> Self {
        CapturedRequest {
            seq,
            url: url.into(),
        }
    }

    /// Number a list of URLs in the order given.
    pub fn sequence<I, S>(urls: I) -> Vec<CapturedRequest>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .enumerate()
            .map(|(seq, url)| CapturedRequest::new(seq, url))
            .collect()
    }

    pub fn consent_signal(&self) -> ConsentSignal {
        ConsentSignal::from_url(&self.url)
    }
}

/// Consent parameters parsed from a single request's query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentSignal {
    pub gcs: Option<String>,
    pub gcd: Option<String>,
}

impl ConsentSignal {
    /// Extract `gcs`/`gcd` from a URL.
    ///
    /// First occurrence of each key wins; empty values count as absent.
    /// Unparseable URLs yield an empty signal.
    pub fn from_url(raw: &str) -> Self {
        let parsed = match Url::parse(raw) {
            Ok(u) => u,
            Err(_) => return ConsentSignal::default(),
        };

        let mut gcs: Option<String> = None;
        let mut gcd: Option<String> = None;
        for (key, val) in parsed.query_pairs() {
            match key.as_ref() {
                "gcs" if gcs.is_none() => gcs = Some(val.into_owned()),
                "gcd" if gcd.is_none() => gcd = Some(val.into_owned()),
                _ => {}
            }
        }

        ConsentSignal {
            gcs: gcs.filter(|v| !v.is_empty()),
            gcd: gcd.filter(|v| !v.is_empty()),
        }
    }

    pub fn has_gcs(&self) -> bool {
        self.gcs.is_some()
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// The `gcs`/`gcd` pair echoed back on a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentValues {
    pub gcs: String,
    pub gcd: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Pass,
    Fail,
    Unknown,
    NoTracking,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Pass => "pass",
            VerdictStatus::Fail => "fail",
            VerdictStatus::Unknown => "unknown",
            VerdictStatus::NoTracking => "no_tracking",
        }
    }
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a consent check. Only `Pass`, `Fail` and `Unknown` can carry
/// echoed consent values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass {
        consent: ConsentValues,
        message: String,
        details: String,
    },
    Fail {
        consent: ConsentValues,
        message: String,
        details: String,
    },
    Unknown {
        consent: Option<ConsentValues>,
        message: String,
        details: String,
    },
    NoTracking {
        message: String,
        details: String,
    },
}

impl Verdict {
    pub fn status(&self) -> VerdictStatus {
        match self {
            Verdict::Pass { .. } => VerdictStatus::Pass,
            Verdict::Fail { .. } => VerdictStatus::Fail,
            Verdict::Unknown { .. } => VerdictStatus::Unknown,
            Verdict::NoTracking { .. } => VerdictStatus::NoTracking,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Verdict::Pass { message, .. }
            | Verdict::Fail { message, .. }
            | Verdict::Unknown { message, .. }
            | Verdict::NoTracking { message, .. } => message,
        }
    }

    pub fn details(&self) -> &str {
        match self {
            Verdict::Pass { details, .. }
            | Verdict::Fail { details, .. }
            | Verdict::Unknown { details, .. }
            | Verdict::NoTracking { details, .. } => details,
        }
    }

    pub fn consent(&self) -> Option<&ConsentValues> {
        match self {
            Verdict::Pass { consent, .. } | Verdict::Fail { consent, .. } => Some(consent),
            Verdict::Unknown { consent, .. } => consent.as_ref(),
            Verdict::NoTracking { .. } => None,
        }
    }

    pub fn gcs(&self) -> Option<&str> {
        self.consent().map(|c| c.gcs.as_str())
    }

    pub fn gcd(&self) -> Option<&str> {
        self.consent().and_then(|c| c.gcd.as_deref())
    }
}

/// Wire shape of a verdict. Field names are part of the HTTP contract.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerdictRecord<'a> {
    status: VerdictStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    gcs_value: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gcd_value: Option<&'a str>,
    message: &'a str,
    details: &'a str,
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        VerdictRecord {
            status: self.status(),
            gcs_value: self.gcs(),
            gcd_value: self.gcd(),
            message: self.message(),
            details: self.details(),
        }
        .serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
