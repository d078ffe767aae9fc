//! consent-core: Google Consent Mode detection library.
//!
//! No async, no network: just classification and decoding over captured
//! request URLs. `consent-server` supplies the browser probe, CLI and web UI.

pub mod assess;
pub mod classify;
pub mod config;
pub mod decode;
pub mod types;

// Re-export commonly used types at crate root
pub use assess::{assess, Assessment};
pub use classify::{is_tracking_request, MatchRule, MatchRules};
pub use decode::decode;
pub use types::*;
