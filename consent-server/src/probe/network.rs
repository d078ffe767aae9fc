//! Request recording and network-idle detection for one page load.
//!
//! Requests are recorded from the page session and from every child session
//! auto-attached under it (out-of-process iframes, workers), in arrival
//! order. The page is idle once its `load` event has fired and no request in
//! any tracked session has been in flight for the configured quiet period.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde_json::Value;

use consent_core::CapturedRequest;

use super::cdp::CdpEvent;

pub struct NetworkActivity {
    page_session: String,
    sessions: HashSet<String>,
    idle: Duration,
    urls: Vec<String>,
    /// (session id, request id)
    in_flight: HashSet<(String, String)>,
    loaded: bool,
    quiet_since: Option<Instant>,
}

impl NetworkActivity {
    pub fn new(page_session: impl Into<String>, idle: Duration) -> Self {
        let page_session = page_session.into();
        NetworkActivity {
            sessions: HashSet::from([page_session.clone()]),
            page_session,
            idle,
            urls: Vec::new(),
            in_flight: HashSet::new(),
            loaded: false,
            quiet_since: None,
        }
    }

    /// Apply one CDP event. Events from untracked sessions are ignored.
    ///
    /// Returns the session id of a newly attached child target; the caller
    /// must enable `Network` on it for its requests to arrive.
    pub fn observe(&mut self, event: &CdpEvent, now: Instant) -> Option<String> {
        let session = match event.session_id.as_deref() {
            Some(s) if self.sessions.contains(s) => s,
            _ => return None,
        };

        let mut attached = None;
        match event.method.as_str() {
            "Network.requestWillBeSent" => {
                if let Some(url) = event.params["request"]["url"].as_str() {
                    self.urls.push(url.to_string());
                }
                // Redirect hops reuse the request id; it stays in flight.
                if let Some(id) = request_id(&event.params) {
                    self.in_flight.insert((session.to_string(), id.to_string()));
                }
            }
            "Network.loadingFinished" | "Network.loadingFailed" => {
                if let Some(id) = request_id(&event.params) {
                    self.in_flight.remove(&(session.to_string(), id.to_string()));
                }
            }
            "Page.loadEventFired" if session == self.page_session => self.loaded = true,
            "Target.attachedToTarget" => {
                let child = event.params["sessionId"].as_str()?;
                if self.sessions.insert(child.to_string()) {
                    attached = Some(child.to_string());
                }
            }
            "Target.detachedFromTarget" => {
                let child = event.params["sessionId"].as_str()?;
                if child != self.page_session {
                    self.sessions.remove(child);
                    self.in_flight.retain(|(s, _)| s != child);
                }
            }
            _ => return None,
        }

        if self.loaded && self.in_flight.is_empty() {
            self.quiet_since.get_or_insert(now);
        } else {
            self.quiet_since = None;
        }
        attached
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        self.quiet_since
            .is_some_and(|since| now.saturating_duration_since(since) >= self.idle)
    }

    /// When the idle condition could next become true, if the page stays
    /// quiet. `None` while requests are in flight or before `load`.
    pub fn idle_at(&self) -> Option<Instant> {
        self.quiet_since.map(|since| since + self.idle)
    }

    pub fn request_count(&self) -> usize {
        self.urls.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn into_requests(self) -> Vec<CapturedRequest> {
        CapturedRequest::sequence(self.urls)
    }
}

fn request_id(params: &Value) -> Option<&str> {
    params.get("requestId").and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SESSION: &str = "S1";

    fn event(method: &str, params: Value) -> CdpEvent {
        event_in(SESSION, method, params)
    }

    fn event_in(session: &str, method: &str, params: Value) -> CdpEvent {
        CdpEvent {
            method: method.into(),
            params,
            session_id: Some(session.into()),
        }
    }

    fn attach(child: &str) -> CdpEvent {
        event(
            "Target.attachedToTarget",
            json!({"sessionId": child, "targetInfo": {"type": "iframe"}, "waitingForDebugger": false}),
        )
    }

    fn request(id: &str, url: &str) -> CdpEvent {
        event(
            "Network.requestWillBeSent",
            json!({"requestId": id, "request": {"url": url}}),
        )
    }

    fn finished(id: &str) -> CdpEvent {
        event("Network.loadingFinished", json!({"requestId": id}))
    }

    #[test]
    fn test_records_in_arrival_order() {
        let t0 = Instant::now();
        let mut net = NetworkActivity::new(SESSION, Duration::from_millis(500));
        net.observe(&request("1", "https://shop.test/"), t0);
        net.observe(&request("2", "https://www.googletagmanager.com/gtag/js"), t0);
        net.observe(&request("3", "https://region1.google-analytics.com/g/collect?gcs=G100"), t0);

        let reqs = net.into_requests();
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[0].url, "https://shop.test/");
        assert_eq!(reqs[2].seq, 2);
    }

    #[test]
    fn test_idle_after_load_and_quiet_period() {
        let t0 = Instant::now();
        let idle = Duration::from_millis(500);
        let mut net = NetworkActivity::new(SESSION, idle);

        net.observe(&request("1", "https://shop.test/"), t0);
        net.observe(&finished("1"), t0);
        // Not idle before load
        assert!(!net.is_idle(t0 + Duration::from_secs(5)));

        let t1 = t0 + Duration::from_millis(100);
        net.observe(&event("Page.loadEventFired", json!({})), t1);
        assert_eq!(net.idle_at(), Some(t1 + idle));
        assert!(!net.is_idle(t1 + Duration::from_millis(499)));
        assert!(net.is_idle(t1 + idle));
    }

    #[test]
    fn test_new_request_resets_quiet_period() {
        let t0 = Instant::now();
        let mut net = NetworkActivity::new(SESSION, Duration::from_millis(500));
        net.observe(&event("Page.loadEventFired", json!({})), t0);
        assert!(net.idle_at().is_some());

        let t1 = t0 + Duration::from_millis(300);
        net.observe(&request("9", "https://stats.g.doubleclick.net/g/collect"), t1);
        assert_eq!(net.in_flight(), 1);
        assert!(net.idle_at().is_none());
        assert!(!net.is_idle(t1 + Duration::from_secs(10)));

        let t2 = t1 + Duration::from_millis(50);
        net.observe(&event("Network.loadingFailed", json!({"requestId": "9"})), t2);
        assert!(net.is_idle(t2 + Duration::from_millis(500)));
    }

    #[test]
    fn test_redirect_reuses_request_id() {
        let t0 = Instant::now();
        let mut net = NetworkActivity::new(SESSION, Duration::from_millis(500));
        net.observe(&request("1", "http://shop.test/"), t0);
        net.observe(&request("1", "https://shop.test/"), t0);
        assert_eq!(net.request_count(), 2);
        assert_eq!(net.in_flight(), 1);
        net.observe(&finished("1"), t0);
        assert_eq!(net.in_flight(), 0);
    }

    #[test]
    fn test_other_sessions_ignored() {
        let t0 = Instant::now();
        let mut net = NetworkActivity::new(SESSION, Duration::from_millis(500));
        let mut foreign = request("1", "https://other.test/");
        foreign.session_id = Some("S2".into());
        net.observe(&foreign, t0);
        foreign.session_id = None;
        net.observe(&foreign, t0);
        assert_eq!(net.request_count(), 0);
    }

    #[test]
    fn test_child_session_requests_recorded_in_order() {
        let t0 = Instant::now();
        let mut net = NetworkActivity::new(SESSION, Duration::from_millis(500));
        net.observe(&request("1", "https://shop.test/"), t0);

        assert_eq!(net.observe(&attach("AD1"), t0), Some("AD1".to_string()));
        // Re-announcing a known session needs no second Network.enable
        assert_eq!(net.observe(&attach("AD1"), t0), None);
        assert_eq!(net.session_count(), 2);

        let iframe_hit = json!({
            "requestId": "1",
            "request": {"url": "https://googleads.g.doubleclick.net/pagead/ads?gcs=G111"}
        });
        net.observe(&event_in("AD1", "Network.requestWillBeSent", iframe_hit), t0);
        net.observe(&request("2", "https://region1.google-analytics.com/g/collect?gcs=G100"), t0);

        // Same request id in two sessions is two requests
        assert_eq!(net.in_flight(), 3);

        let reqs = net.into_requests();
        let urls: Vec<&str> = reqs.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://shop.test/",
                "https://googleads.g.doubleclick.net/pagead/ads?gcs=G111",
                "https://region1.google-analytics.com/g/collect?gcs=G100",
            ]
        );
    }

    #[test]
    fn test_child_requests_hold_off_idle() {
        let t0 = Instant::now();
        let mut net = NetworkActivity::new(SESSION, Duration::from_millis(500));
        net.observe(&attach("W1"), t0);
        net.observe(&event("Page.loadEventFired", json!({})), t0);
        assert!(net.idle_at().is_some());

        let hit = json!({"requestId": "7", "request": {"url": "https://www.googletagmanager.com/sw_iframe.html"}});
        net.observe(&event_in("W1", "Network.requestWillBeSent", hit), t0);
        assert!(net.idle_at().is_none());

        // A child's load event does not count as the page's
        let mut fresh = NetworkActivity::new(SESSION, Duration::from_millis(500));
        fresh.observe(&attach("W1"), t0);
        fresh.observe(&event_in("W1", "Page.loadEventFired", json!({})), t0);
        assert!(fresh.idle_at().is_none());

        let t1 = t0 + Duration::from_millis(20);
        net.observe(&event_in("W1", "Network.loadingFinished", json!({"requestId": "7"})), t1);
        assert_eq!(net.idle_at(), Some(t1 + Duration::from_millis(500)));
    }

    #[test]
    fn test_detach_drops_child_in_flight() {
        let t0 = Instant::now();
        let mut net = NetworkActivity::new(SESSION, Duration::from_millis(500));
        net.observe(&event("Page.loadEventFired", json!({})), t0);
        net.observe(&attach("AD1"), t0);
        let hit = json!({"requestId": "3", "request": {"url": "https://tpc.googlesyndication.com/sodar"}});
        net.observe(&event_in("AD1", "Network.requestWillBeSent", hit.clone()), t0);
        assert_eq!(net.in_flight(), 1);

        net.observe(&event("Target.detachedFromTarget", json!({"sessionId": "AD1"})), t0);
        assert_eq!(net.in_flight(), 0);
        assert!(net.idle_at().is_some());

        // Later events from the detached session are ignored
        net.observe(&event_in("AD1", "Network.requestWillBeSent", hit), t0);
        assert_eq!(net.request_count(), 1);
    }
}
