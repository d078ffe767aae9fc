//! Tracking-request classifier: decides whether an outbound request URL is
//! a Google analytics / ads / tag-manager call.
//!
//! The rule set is data: a list of known host/path fragments plus two
//! structural predicates for first-party proxies and Measurement Protocol
//! hits. Matching is case-sensitive and purely textual.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Known Google tracking host/path fragments. A URL containing any of these
/// anywhere (host, path or query) is a tracking request.
pub const DEFAULT_FRAGMENTS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "googleadservices.com",
    "googlesyndication.com",
    "google.com/pagead",
    "google.com/ads",
    "google.com/ccm",
    "analytics.google.com",
    "stats.g.doubleclick.net",
    "region1.analytics.google.com",
    "google.de/ads",
];

const GTM_COLLECT_PATH: &str = "/g/collect";
const GTM_HOST_LABEL: &str = "gtm.";
const COLLECT_PATH: &str = "/collect";
const MEASUREMENT_KEYS: &[&str] = &["gcs", "gtm"];

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MatchRule {
    /// URL contains the fragment anywhere.
    Fragment(String),
    /// Path contains `/g/collect` and host contains a `gtm.` label
    /// (server-side GTM behind a first-party domain).
    GtmProxy,
    /// Path contains `/collect` and the query has a `gcs` or `gtm` key.
    MeasurementProtocol,
}

impl MatchRule {
    pub fn matches(&self, url: &str) -> bool {
        match self {
            MatchRule::Fragment(fragment) => url.contains(fragment.as_str()),
            MatchRule::GtmProxy => {
                let parts = UrlParts::split(url);
                parts.path.contains(GTM_COLLECT_PATH) && parts.host.contains(GTM_HOST_LABEL)
            }
            MatchRule::MeasurementProtocol => {
                let parts = UrlParts::split(url);
                parts.path.contains(COLLECT_PATH)
                    && parts
                        .query_keys()
                        .any(|key| MEASUREMENT_KEYS.contains(&key))
            }
        }
    }
}

/// An ordered set of match rules. A URL is tracking traffic if any rule
/// matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MatchRules {
    rules: Vec<MatchRule>,
}

impl Default for MatchRules {
    fn default() -> Self {
        let mut rules: Vec<MatchRule> = DEFAULT_FRAGMENTS
            .iter()
            .map(|f| MatchRule::Fragment((*f).to_string()))
            .collect();
        rules.push(MatchRule::GtmProxy);
        rules.push(MatchRule::MeasurementProtocol);
        MatchRules { rules }
    }
}

impl MatchRules {
    /// Default rules plus extra fragments (e.g. from the config file).
    /// Blank and duplicate fragments are ignored.
    pub fn with_extra_fragments<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = MatchRules::default();
        for fragment in extra {
            let fragment = fragment.as_ref().trim();
            if fragment.is_empty() {
                continue;
            }
            let rule = MatchRule::Fragment(fragment.to_string());
            if !set.rules.contains(&rule) {
                set.rules.push(rule);
            }
        }
        set
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    pub fn matches(&self, url: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(url))
    }
}

/// Classify a URL against the default rule set.
pub fn is_tracking_request(url: &str) -> bool {
    MatchRules::default().matches(url)
}

// ---------------------------------------------------------------------------
// Textual URL split
// ---------------------------------------------------------------------------

/// Host / path / query slices of a URL, split on delimiters only.
#[derive(Debug, PartialEq, Eq)]
struct UrlParts<'a> {
    host: &'a str,
    path: &'a str,
    query: &'a str,
}

impl<'a> UrlParts<'a> {
    fn split(url: &'a str) -> Self {
        let url = url.split_once('#').map_or(url, |(before, _)| before);
        let rest = url.split_once("://").map_or(url, |(_, after)| after);

        let host_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let (host, rest) = rest.split_at(host_end);
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

        UrlParts { host, path, query }
    }

    /// Keys of `key=value` pairs in the query string.
    fn query_keys(&self) -> impl Iterator<Item = &'a str> {
        self.query
            .split('&')
            .filter_map(|pair| pair.split_once('=').map(|(key, _)| key))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_hosts() {
        for url in [
            "https://www.google-analytics.com/analytics.js",
            "https://www.googletagmanager.com/gtag/js?id=G-ABC123",
            "https://ad.doubleclick.net/ddm/activity/src=1",
            "https://www.googleadservices.com/pagead/conversion/123/",
            "https://pagead2.googlesyndication.com/pagead/js/adsbygoogle.js",
            "https://www.google.com/pagead/1p-conversion/123/",
            "https://www.google.com/ads/ga-audiences?v=1",
            "https://www.google.com/ccm/collect?en=page_view",
            "https://region1.analytics.google.com/g/collect?v=2",
            "https://stats.g.doubleclick.net/g/collect?v=2",
            "https://www.google.de/ads/ga-audiences?v=1",
        ] {
            assert!(is_tracking_request(url), "{url}");
        }
    }

    #[test]
    fn test_unrelated_urls() {
        for url in [
            "https://example.com/",
            "https://cdn.example.com/app.js",
            "https://fonts.googleapis.com/css2?family=Roboto",
            "https://www.google.com/recaptcha/api.js",
            "https://example.com/collect?v=2",
            "https://example.com/g/collect?v=2",
        ] {
            assert!(!is_tracking_request(url), "{url}");
        }
    }

    #[test]
    fn test_fragment_matches_in_query() {
        assert!(is_tracking_request(
            "https://example.com/redirect?to=https://googletagmanager.com/"
        ));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert!(!is_tracking_request("https://WWW.GOOGLE-ANALYTICS.COM/analytics.js"));
    }

    #[test]
    fn test_gtm_proxy() {
        assert!(is_tracking_request("https://gtm.shop.example/g/collect?v=2&tid=G-1"));
        assert!(MatchRule::GtmProxy.matches("https://sgtm.example.com/g/collect"));
        // gtm. label only in the path does not count
        assert!(!MatchRule::GtmProxy.matches("https://example.com/gtm.js/g/collect"));
        assert!(!MatchRule::GtmProxy.matches("https://gtm.example.com/collect"));
    }

    #[test]
    fn test_measurement_protocol() {
        assert!(is_tracking_request("https://metrics.example.com/collect?v=2&gcs=G100"));
        assert!(is_tracking_request("https://metrics.example.com/x/collect?gtm=45je1"));
        assert!(!MatchRule::MeasurementProtocol.matches("https://example.com/collect?xgcs=1"));
        assert!(!MatchRule::MeasurementProtocol.matches("https://example.com/collect?gcs"));
        assert!(!MatchRule::MeasurementProtocol.matches("https://example.com/page?gcs=G100"));
    }

    #[test]
    fn test_split_url() {
        let parts = UrlParts::split("https://gtm.example.com:8443/g/collect?v=2&gcs=G1#frag");
        assert_eq!(parts.host, "gtm.example.com:8443");
        assert_eq!(parts.path, "/g/collect");
        assert_eq!(parts.query, "v=2&gcs=G1");

        let parts = UrlParts::split("https://example.com?gcs=G1");
        assert_eq!(parts.host, "example.com");
        assert_eq!(parts.path, "");
        assert_eq!(parts.query, "gcs=G1");
    }

    #[test]
    fn test_extra_fragments() {
        let rules = MatchRules::with_extra_fragments(["metrics.shop.example", "  ", "doubleclick.net"]);
        assert_eq!(rules.rules().len(), MatchRules::default().rules().len() + 1);
        assert!(rules.matches("https://metrics.shop.example/tag.js"));
        assert!(!MatchRules::default().matches("https://metrics.shop.example/tag.js"));
    }

    #[test]
    fn test_rules_serialize() {
        let json = serde_json::to_value(MatchRules::default()).unwrap();
        let arr = json.as_array().unwrap();
        assert_eq!(arr[0]["kind"], "fragment");
        assert_eq!(arr[0]["value"], "google-analytics.com");
        assert_eq!(arr[arr.len() - 1]["kind"], "measurement_protocol");
    }
}
