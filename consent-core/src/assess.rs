//! Verdict assembly: turns the captured request sequence of one page load
//! into a single verdict.
//!
//! Tracking requests are filtered in arrival order, then the first one that
//! carries a non-empty `gcs` is decoded. Earlier tracking requests without
//! `gcs` are skipped; later ones carrying `gcs` are ignored.

use crate::classify::MatchRules;
use crate::decode::{decode, MSG_NOT_DETECTED};
use crate::types::{CapturedRequest, Verdict};

/// How many request URLs the `no_tracking` details list.
const SAMPLE_REQUESTS: usize = 10;

/// Verdict plus the intermediate results that produced it.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub verdict: Verdict,
    pub total_requests: usize,
    pub tracking: Vec<CapturedRequest>,
    /// The request the verdict was decoded from, if any.
    pub consent_request: Option<CapturedRequest>,
}

pub fn assess(requests: &[CapturedRequest], rules: &MatchRules) -> Assessment {
    let tracking: Vec<CapturedRequest> = requests
        .iter()
        .filter(|r| rules.matches(&r.url))
        .cloned()
        .collect();

    if tracking.is_empty() {
        let sample: Vec<&str> = requests
            .iter()
            .take(SAMPLE_REQUESTS)
            .map(|r| r.url.as_str())
            .collect();
        return Assessment {
            verdict: Verdict::NoTracking {
                message: "No Google tracking requests detected".into(),
                details: format!(
                    "The website does not appear to use Google Analytics, Google Ads, or Google Tag Manager. Found {} total requests. First {}: {}",
                    requests.len(),
                    SAMPLE_REQUESTS,
                    sample.join(", ")
                ),
            },
            total_requests: requests.len(),
            tracking,
            consent_request: None,
        };
    }

    let found = tracking.iter().find_map(|r| {
        let signal = r.consent_signal();
        signal.has_gcs().then(|| (r.clone(), signal))
    });

    let (verdict, consent_request) = match found {
        Some((request, signal)) => (
            decode(signal.gcs.as_deref(), signal.gcd.as_deref()),
            Some(request),
        ),
        None => {
            let urls: Vec<&str> = tracking.iter().map(|r| r.url.as_str()).collect();
            (
                Verdict::Unknown {
                    consent: None,
                    message: MSG_NOT_DETECTED.into(),
                    details: format!(
                        "Found {} Google requests but none contain consent parameters. All requests: {}",
                        tracking.len(),
                        urls.join(" | ")
                    ),
                },
                None,
            )
        }
    };

    Assessment {
        verdict,
        total_requests: requests.len(),
        tracking,
        consent_request,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
