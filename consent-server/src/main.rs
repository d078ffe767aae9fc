//! consent-check: CLI + web server for Google Consent Mode checks.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use consent_core::config::{self, Config};
use consent_core::{assess, Assessment, CapturedRequest, Verdict};

mod check;
mod probe;
mod web;

use check::{check_consent, CheckError};
use probe::ChromeProbe;

#[derive(Parser)]
#[command(
    name = "consent-check",
    version,
    about = "Check whether a site's Google Consent Mode denies tracking by default"
)]
struct Cli {
    /// Log filter directive (e.g. info, debug, consent_server=trace)
    #[arg(long, global = true, env = "CONSENT_LOG", default_value = "info")]
    log_level: String,

    /// Config file (defaults to ~/.consent-check/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a URL in headless Chrome and print the consent verdict
    Check {
        /// Absolute http(s) URL of the page to check
        url: String,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,

        /// Chrome/Chromium executable
        #[arg(long, env = "CHROME_PATH")]
        chrome: Option<String>,
    },

    /// Assess a list of captured request URLs (one per line) without a browser
    Assess {
        /// File of request URLs in arrival order, or `-` for stdin
        file: PathBuf,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the checker form and JSON API
    Serve {
        #[arg(long, env = "CONSENT_HOST")]
        host: Option<String>,

        #[arg(long, env = "CONSENT_PORT")]
        port: Option<u16>,

        /// Chrome/Chromium executable
        #[arg(long, env = "CHROME_PATH")]
        chrome: Option<String>,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(config::config_file);
    let config = config::load_config_from(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config {}: {e}", config_path.display());
        std::process::exit(2);
    });

    match cli.command {
        Commands::Check { url, json, chrome } => cmd_check(config, &url, json, chrome).await,
        Commands::Assess { file, json } => cmd_assess(&config, file, json),
        Commands::Serve { host, port, chrome } => cmd_serve(config, host, port, chrome).await,
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(&config_path, force),
            ConfigAction::Show => print!("{}", config::serialize_config(&config)),
        },
    }
}

async fn cmd_check(mut config: Config, url: &str, json: bool, chrome: Option<String>) {
    if chrome.is_some() {
        config.probe.chrome_path = chrome;
    }
    let rules = config.match_rules();
    let probe = ChromeProbe::new(config.probe);

    match check_consent(&probe, &rules, Some(url)).await {
        Ok(assessment) => print_assessment(&assessment, json),
        Err(CheckError::Target(e)) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
        Err(CheckError::Probe(e)) => {
            if e.is_launch() {
                eprintln!("Failed to launch browser: {e}");
            } else {
                eprintln!("Failed to load website: {e}");
            }
            std::process::exit(1);
        }
    }
}

fn cmd_assess(config: &Config, file: PathBuf, json: bool) {
    let reader: Box<dyn BufRead> = if file.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let f = std::fs::File::open(&file).unwrap_or_else(|e| {
            eprintln!("Error opening {}: {e}", file.display());
            std::process::exit(1);
        });
        Box::new(io::BufReader::new(f))
    };

    let urls = read_request_urls(reader).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", file.display());
        std::process::exit(1);
    });

    let requests = CapturedRequest::sequence(urls);
    let assessment = assess(&requests, &config.match_rules());
    print_assessment(&assessment, json);
}

/// One URL per line; blank lines and `#` comments are skipped. Bytes that
/// are not UTF-8 are replaced rather than ending the list early.
fn read_request_urls(reader: impl BufRead) -> io::Result<Vec<String>> {
    let mut urls = Vec::new();
    for line in reader.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            urls.push(line.to_string());
        }
    }
    Ok(urls)
}

async fn cmd_serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    chrome: Option<String>,
) {
    if chrome.is_some() {
        config.probe.chrome_path = chrome;
    }
    let host = host.unwrap_or(config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let state = Arc::new(web::AppState {
        rules: config.match_rules(),
        probe: Arc::new(ChromeProbe::new(config.probe)),
    });

    if let Err(e) = web::serve(state, &host, port).await {
        eprintln!("Error serving on {host}:{port}: {e}");
        std::process::exit(1);
    }
}

fn cmd_config_init(path: &std::path::Path, force: bool) {
    if path.exists() && !force {
        eprintln!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
        std::process::exit(1);
    }
    if let Err(e) = config::save_config_to(&Config::default(), path) {
        eprintln!("Error writing config {}: {e}", path.display());
        std::process::exit(1);
    }
    println!("Wrote {}", path.display());
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_assessment(assessment: &Assessment, json: bool) {
    if json {
        match serde_json::to_string_pretty(&assessment.verdict) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error encoding verdict: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!();
    println!(
        "Requests: {} observed, {} Google tracking",
        assessment.total_requests,
        assessment.tracking.len()
    );

    if !assessment.tracking.is_empty() {
        println!();
        let mut table = Table::new();
        table.set_header(vec!["#", "Tracking request", "gcs", "gcd", "Used"]);
        let used = assessment.consent_request.as_ref().map(|r| r.seq);
        for req in &assessment.tracking {
            let signal = req.consent_signal();
            table.add_row(vec![
                Cell::new(req.seq),
                Cell::new(shorten(&req.url, 90)),
                Cell::new(signal.gcs.as_deref().unwrap_or("-")),
                Cell::new(signal.gcd.as_deref().unwrap_or("-")),
                Cell::new(if used == Some(req.seq) { "*" } else { "" }),
            ]);
        }
        println!("{table}");
    }

    println!();
    print_verdict(&assessment.verdict);
}

fn print_verdict(verdict: &Verdict) {
    let mut table = Table::new();
    table.add_row(vec![Cell::new("Status"), Cell::new(verdict.status().as_str().to_uppercase())]);
    table.add_row(vec![Cell::new("Message"), Cell::new(verdict.message())]);
    table.add_row(vec![Cell::new("GCS"), Cell::new(verdict.gcs().unwrap_or("-"))]);
    table.add_row(vec![Cell::new("GCD (v2)"), Cell::new(verdict.gcd().unwrap_or("-"))]);
    table.add_row(vec![Cell::new("Details"), Cell::new(verdict.details())]);
    println!("{table}");
}

/// Truncate long URLs for table display, on a char boundary.
fn shorten(url: &str, max: usize) -> String {
    if url.chars().count() <= max {
        return url.to_string();
    }
    let mut s: String = url.chars().take(max.saturating_sub(3)).collect();
    s.push_str("...");
    s
}
