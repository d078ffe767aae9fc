//! Configuration file management for consent-check.
//!
//! Reads/writes `~/.consent-check/config.yaml` with server settings, probe
//! timing, and extra tracking fragments.

use std::path::{Path, PathBuf};

use crate::classify::MatchRules;
use crate::types::ConsentError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub probe: ProbeConfig,
    /// Extra fragments appended to the default tracking rules.
    pub tracking: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Chrome/Chromium executable. Looked up on PATH when unset.
    pub chrome_path: Option<String>,
    /// Upper bound for navigation plus network idle.
    pub timeout_secs: u64,
    /// Quiet period with no in-flight requests that counts as idle.
    pub idle_ms: u64,
    /// Extra wait after idle for late beacons.
    pub settle_ms: u64,
    /// Concurrent browser sessions.
    pub max_sessions: usize,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 3000,
            },
            probe: ProbeConfig {
                chrome_path: None,
                timeout_secs: 30,
                idle_ms: 500,
                settle_ms: 2000,
                max_sessions: 2,
                user_agent: DEFAULT_USER_AGENT.into(),
            },
            tracking: Vec::new(),
        }
    }
}

impl Config {
    pub fn match_rules(&self) -> MatchRules {
        MatchRules::with_extra_fragments(&self.tracking)
    }
}

/// Get the config directory path (`~/.consent-check/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".consent-check")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `path`, usually [`config_file`].
///
/// Returns default config if the file doesn't exist.
pub fn load_config_from(path: &Path) -> Result<Config, ConsentError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConsentError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serialize_config(config))?;
    Ok(())
}

/// Parse simple YAML-like config text.
pub fn parse_config(text: &str) -> Result<Config, ConsentError> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for (lineno, line) in text.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        // List items only appear under `tracking:`
        if let Some(item) = stripped.strip_prefix("- ") {
            if current_section.as_deref() != Some("tracking") {
                return Err(ConsentError::Config(format!(
                    "line {}: list item outside tracking section",
                    lineno + 1
                )));
            }
            if let Some(v) = parse_string_value(item.trim()) {
                config.tracking.push(v);
            }
            continue;
        }

        let (key, val) = match stripped.split_once(':') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => {
                return Err(ConsentError::Config(format!(
                    "line {}: expected `key: value`",
                    lineno + 1
                )))
            }
        };

        if !is_indented {
            current_section = if val.is_empty() {
                Some(key.to_string())
            } else {
                None
            };
            continue;
        }

        let section = match current_section.as_deref() {
            Some(s) => s,
            None => continue,
        };

        match (section, key) {
            ("server", "host") => {
                if let Some(v) = parse_string_value(val) {
                    config.server.host = v;
                }
            }
            ("server", "port") => config.server.port = parse_number(val, key, lineno)?,
            ("probe", "chrome_path") => config.probe.chrome_path = parse_string_value(val),
            ("probe", "timeout_secs") => config.probe.timeout_secs = parse_number(val, key, lineno)?,
            ("probe", "idle_ms") => config.probe.idle_ms = parse_number(val, key, lineno)?,
            ("probe", "settle_ms") => config.probe.settle_ms = parse_number(val, key, lineno)?,
            ("probe", "max_sessions") => {
                config.probe.max_sessions = parse_number::<usize>(val, key, lineno)?.max(1)
            }
            ("probe", "user_agent") => {
                if let Some(v) = parse_string_value(val) {
                    config.probe.user_agent = v;
                }
            }
            _ => {}
        }
    }

    Ok(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_number<T: std::str::FromStr>(
    val: &str,
    key: &str,
    lineno: usize,
) -> Result<T, ConsentError> {
    val.parse().map_err(|_| {
        ConsentError::Config(format!("line {}: invalid {key}: {val}", lineno + 1))
    })
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# consent-check configuration".to_string(), String::new()];

    lines.push("server:".into());
    lines.push(format!("  host: \"{}\"", config.server.host));
    lines.push(format!("  port: {}", config.server.port));
    lines.push(String::new());

    lines.push("probe:".into());
    match &config.probe.chrome_path {
        Some(p) => lines.push(format!("  chrome_path: \"{p}\"")),
        None => lines.push("  chrome_path: null".into()),
    }
    lines.push(format!("  timeout_secs: {}", config.probe.timeout_secs));
    lines.push(format!("  idle_ms: {}", config.probe.idle_ms));
    lines.push(format!("  settle_ms: {}", config.probe.settle_ms));
    lines.push(format!("  max_sessions: {}", config.probe.max_sessions));
    lines.push(format!("  user_agent: \"{}\"", config.probe.user_agent));
    lines.push(String::new());

    lines.push("# extra tracking host/path fragments".into());
    lines.push("tracking:".into());
    for fragment in &config.tracking {
        lines.push(format!("  - \"{fragment}\""));
    }

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
