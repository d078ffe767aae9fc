//! Decode the Consent Mode `gcs` parameter into a verdict.
//!
//! `gcs` format: `G1xy`
//! - `x`: ad_storage        (`1` granted, anything else denied)
//! - `y`: analytics_storage (`1` granted, anything else denied)
//!
//! `gcd` (Consent Mode v2) is echoed but never drives the verdict.

use crate::types::{ConsentValues, Verdict};

const GCS_PREFIX: &str = "G1";

pub const MSG_NOT_DETECTED: &str =
    "No consent mode detected - gcs parameter not found in Google tracking requests";

/// State of one consent storage flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    Granted,
    Denied,
}

impl StorageState {
    /// `1` is granted; any other character, or a missing one, is denied.
    pub fn from_flag(flag: Option<char>) -> Self {
        match flag {
            Some('1') => StorageState::Granted,
            _ => StorageState::Denied,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageState::Granted => "granted",
            StorageState::Denied => "denied",
        }
    }
}

/// The consent code after the `G1` prefix, or `None` without the prefix.
/// The code is not length-checked: `G1` yields `""`, `G1000` yields `"000"`.
pub fn parse_gcs(gcs: &str) -> Option<&str> {
    gcs.strip_prefix(GCS_PREFIX)
}

/// Decode consent parameters into a verdict. Total over all inputs.
pub fn decode(gcs: Option<&str>, gcd: Option<&str>) -> Verdict {
    let gcs = match gcs.filter(|v| !v.is_empty()) {
        Some(v) => v,
        None => {
            return Verdict::Unknown {
                consent: None,
                message: MSG_NOT_DETECTED.into(),
                details: "The website may not be using Google Consent Mode, or consent mode is not properly configured".into(),
            }
        }
    };

    let consent = ConsentValues {
        gcs: gcs.to_string(),
        gcd: gcd.map(str::to_string),
    };

    match parse_gcs(gcs) {
        Some("11") => Verdict::Fail {
            consent,
            message: "Consent mode allows tracking by default".into(),
            details: "Both ad_storage and analytics_storage are set to 'granted' by default, which means tracking is enabled before user consent".into(),
        },
        Some("00") => Verdict::Pass {
            consent,
            message: "Consent mode properly denies tracking by default".into(),
            details: "Both ad_storage and analytics_storage are set to 'denied' by default, which is the recommended configuration".into(),
        },
        Some(code) => {
            let mut flags = code.chars();
            let ad = StorageState::from_flag(flags.next());
            let analytics = StorageState::from_flag(flags.next());
            Verdict::Unknown {
                consent: Some(consent),
                message: format!("Partial consent detected: {code}"),
                details: format!(
                    "Mixed consent state - ad_storage: {}, analytics_storage: {}",
                    ad.as_str(),
                    analytics.as_str(),
                ),
            }
        }
        None => Verdict::Unknown {
            consent: Some(consent),
            message: "Unrecognized gcs parameter format".into(),
            details: format!("Expected format G1xy but got: {gcs}"),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
