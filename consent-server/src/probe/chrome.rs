//! Headless Chrome probe.
//!
//! Each capture launches a fresh browser with its own throwaway profile,
//! attaches to a new page over CDP, navigates, waits for network idle plus a
//! settle window, then tears the browser down. The child process is spawned
//! with `kill_on_drop`, so every early return still releases it.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};
use url::Url;

use consent_core::config::ProbeConfig;
use consent_core::CapturedRequest;

use super::cdp::{CdpConnection, CdpEvent};
use super::network::NetworkActivity;
use super::{BrowserProbe, ProbeError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Executable names tried on PATH when no path is configured.
const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

const MACOS_CHROME: &str = "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome";

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(15);
const LAUNCH_POLL: Duration = Duration::from_millis(50);
const IDLE_POLL: Duration = Duration::from_millis(100);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

const DEVTOOLS_PORT_FILE: &str = "DevToolsActivePort";

// ---------------------------------------------------------------------------
// Executable lookup
// ---------------------------------------------------------------------------

/// Search a PATH-style list for an executable file named `name`.
pub fn find_on_path(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Resolve the Chrome binary: configured path (absolute or on PATH), then
/// the usual executable names, then the macOS app bundle.
pub fn resolve_chrome(configured: Option<&str>) -> Result<PathBuf, ProbeError> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();

    if let Some(configured) = configured {
        let path = Path::new(configured);
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return find_on_path(configured, &path_var).ok_or_else(|| {
            ProbeError::Launch(format!("Chrome executable not found: {configured}"))
        });
    }

    CHROME_CANDIDATES
        .iter()
        .find_map(|name| find_on_path(name, &path_var))
        .or_else(|| {
            let mac = PathBuf::from(MACOS_CHROME);
            mac.is_file().then_some(mac)
        })
        .ok_or_else(|| {
            ProbeError::Launch(
                "no Chrome or Chromium executable found on PATH; set probe.chrome_path or CHROME_PATH"
                    .into(),
            )
        })
}

/// Port from the `DevToolsActivePort` file Chrome writes into its profile
/// directory (first line is the port, second the browser target path).
pub fn parse_devtools_port(contents: &str) -> Option<u16> {
    contents.lines().next()?.trim().parse().ok().filter(|p| *p != 0)
}

// ---------------------------------------------------------------------------
// Browser session
// ---------------------------------------------------------------------------

/// One running Chrome instance. Dropping it kills the process and removes
/// the profile directory.
struct Browser {
    child: Child,
    conn: CdpConnection,
    _profile: TempDir,
}

impl Browser {
    async fn launch(config: &ProbeConfig) -> Result<Browser, ProbeError> {
        let exe = resolve_chrome(config.chrome_path.as_deref())?;
        let profile = tempfile::Builder::new()
            .prefix("consent-check-")
            .tempdir()?;

        debug!(exe = %exe.display(), profile = %profile.path().display(), "launching chrome");

        let mut child = Command::new(&exe)
            .args([
                "--headless=new",
                "--remote-debugging-port=0",
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--no-first-run",
                "--no-default-browser-check",
                "--disable-extensions",
                "--disable-background-networking",
                "--mute-audio",
            ])
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg(format!("--user-agent={}", config.user_agent))
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::Launch(format!("failed to start {}: {e}", exe.display())))?;

        let port = wait_for_devtools_port(&mut child, profile.path()).await?;
        let ws_url = browser_ws_url(port).await?;
        debug!(%ws_url, "devtools endpoint ready");

        let conn = CdpConnection::connect(&ws_url)
            .await
            .map_err(|e| ProbeError::Launch(format!("cannot attach to browser: {e}")))?;

        Ok(Browser {
            child,
            conn,
            _profile: profile,
        })
    }

    /// Open a page, navigate to `target`, and record requests until the page
    /// has been network-idle and the settle window has passed.
    async fn record_page_load(
        &mut self,
        target: &Url,
        config: &ProbeConfig,
    ) -> Result<Vec<CapturedRequest>, ProbeError> {
        let conn = &mut self.conn;

        let created = conn
            .call("Target.createTarget", json!({ "url": "about:blank" }), None)
            .await?;
        let target_id = str_field(&created, "targetId")?;

        let attached = conn
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session = str_field(&attached, "sessionId")?;

        conn.call("Network.enable", json!({}), Some(session.as_str())).await?;
        conn.call("Page.enable", json!({}), Some(session.as_str())).await?;
        conn.call("Target.setAutoAttach", auto_attach_params(), Some(session.as_str())).await?;

        let deadline = Instant::now() + Duration::from_secs(config.timeout_secs);
        let mut activity = NetworkActivity::new(session.clone(), Duration::from_millis(config.idle_ms));

        debug!(url = %target, "navigating");
        let nav = timeout_at(
            deadline,
            conn.call("Page.navigate", json!({ "url": target.as_str() }), Some(session.as_str())),
        )
        .await
        .map_err(|_| ProbeError::Timeout(config.timeout_secs))??;

        if let Some(error) = nav.get("errorText").and_then(Value::as_str) {
            return Err(ProbeError::Navigation(format!("{error} at {target}")));
        }

        // Wait for load + quiet network
        loop {
            let now = Instant::now();
            if activity.is_idle(now.into_std()) {
                break;
            }
            if now >= deadline {
                debug!(
                    requests = activity.request_count(),
                    in_flight = activity.in_flight(),
                    "network never went idle"
                );
                return Err(ProbeError::Timeout(config.timeout_secs));
            }

            let wake = activity
                .idle_at()
                .map(Instant::from_std)
                .unwrap_or(now + IDLE_POLL)
                .min(deadline);
            if let Ok(event) = timeout_at(wake, conn.next_event()).await {
                track_event(conn, &mut activity, event?).await?;
            }
        }
        debug!(
            requests = activity.request_count(),
            "network idle, settling for {}ms", config.settle_ms
        );

        // Late beacons
        let settle_end = Instant::now() + Duration::from_millis(config.settle_ms);
        while let Ok(event) = timeout_at(settle_end, conn.next_event()).await {
            track_event(conn, &mut activity, event?).await?;
        }

        debug!(
            requests = activity.request_count(),
            sessions = activity.session_count(),
            "capture complete"
        );
        Ok(activity.into_requests())
    }

    /// Ask the browser to exit, then make sure the process is gone.
    async fn close(mut self) {
        let _ = timeout(CLOSE_TIMEOUT, self.conn.call("Browser.close", json!({}), None)).await;
        self.conn.close().await;
        if let Err(e) = self.child.kill().await {
            debug!("chrome already exited: {e}");
        }
    }
}

/// Attach to out-of-process iframes and workers as they appear, without
/// pausing them, on flattened sessions.
fn auto_attach_params() -> Value {
    json!({ "autoAttach": true, "waitForDebuggerOnStart": false, "flatten": true })
}

/// Feed one event to `activity`. A newly attached child gets `Network`
/// enabled, and auto-attach for its own children. A child that goes away
/// before answering is not an error.
async fn track_event(
    conn: &mut CdpConnection,
    activity: &mut NetworkActivity,
    event: CdpEvent,
) -> Result<(), ProbeError> {
    let Some(child) = activity.observe(&event, Instant::now().into_std()) else {
        return Ok(());
    };
    debug!(session = %child, kind = ?event.params["targetInfo"]["type"].as_str(), "child target attached");

    for (method, params) in [
        ("Network.enable", json!({})),
        ("Target.setAutoAttach", auto_attach_params()),
    ] {
        match conn.call(method, params, Some(child.as_str())).await {
            Ok(_) => {}
            Err(ProbeError::Protocol(e)) => {
                debug!(session = %child, "child target gone: {e}");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn wait_for_devtools_port(child: &mut Child, profile: &Path) -> Result<u16, ProbeError> {
    let port_file = profile.join(DEVTOOLS_PORT_FILE);
    let deadline = Instant::now() + LAUNCH_TIMEOUT;

    loop {
        if let Ok(contents) = tokio::fs::read_to_string(&port_file).await {
            if let Some(port) = parse_devtools_port(&contents) {
                return Ok(port);
            }
        }
        if let Some(status) = child.try_wait()? {
            return Err(ProbeError::Launch(format!("chrome exited during startup ({status})")));
        }
        if Instant::now() >= deadline {
            return Err(ProbeError::Launch(format!(
                "chrome did not open a devtools port within {}s",
                LAUNCH_TIMEOUT.as_secs()
            )));
        }
        tokio::time::sleep(LAUNCH_POLL).await;
    }
}

/// Browser-level WebSocket URL from the `/json/version` endpoint.
async fn browser_ws_url(port: u16) -> Result<String, ProbeError> {
    let version: Value = reqwest::get(format!("http://127.0.0.1:{port}/json/version"))
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ProbeError::Launch(format!("devtools endpoint unavailable: {e}")))?
        .json()
        .await
        .map_err(|e| ProbeError::Launch(format!("bad /json/version response: {e}")))?;

    if let Some(browser) = version.get("Browser").and_then(Value::as_str) {
        debug!(browser, "connected to chrome");
    }

    version
        .get("webSocketDebuggerUrl")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProbeError::Launch("no webSocketDebuggerUrl in /json/version".into()))
}

fn str_field(value: &Value, key: &str) -> Result<String, ProbeError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProbeError::Protocol(format!("missing {key} in response")))
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// `BrowserProbe` backed by a local Chrome/Chromium install.
pub struct ChromeProbe {
    config: ProbeConfig,
    sessions: Arc<Semaphore>,
}

impl ChromeProbe {
    pub fn new(config: ProbeConfig) -> Self {
        let permits = config.max_sessions.max(1);
        ChromeProbe {
            config,
            sessions: Arc::new(Semaphore::new(permits)),
        }
    }
}

#[async_trait]
impl BrowserProbe for ChromeProbe {
    async fn capture(&self, target: &Url) -> Result<Vec<CapturedRequest>, ProbeError> {
        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|_| ProbeError::Launch("probe is shutting down".into()))?;

        let mut browser = Browser::launch(&self.config).await?;
        let result = browser.record_page_load(target, &self.config).await;
        if let Err(e) = &result {
            warn!(url = %target, "page load failed: {e}");
        }
        browser.close().await;
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
