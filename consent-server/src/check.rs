//! One consent check: validate the target, probe it, assess the traffic.
//!
//! Shared by the `check` CLI command and the HTTP API.

use thiserror::Error;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use consent_core::{assess, Assessment, MatchRules};

use crate::probe::{validate_target, BrowserProbe, ProbeError, TargetError};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Run a full check. Invalid targets are rejected before the probe runs;
/// probe failures are returned as errors, never as verdicts.
pub async fn check_consent(
    probe: &dyn BrowserProbe,
    rules: &MatchRules,
    raw_url: Option<&str>,
) -> Result<Assessment, CheckError> {
    let target = validate_target(raw_url)?;
    let span = info_span!("check", id = %Uuid::new_v4(), url = %target);

    async move {
        info!("probing");
        let requests = probe.capture(&target).await?;
        let assessment = assess(&requests, rules);
        info!(
            status = %assessment.verdict.status(),
            requests = assessment.total_requests,
            tracking = assessment.tracking.len(),
            gcs = assessment.verdict.gcs().unwrap_or("-"),
            "check complete"
        );
        Ok::<_, CheckError>(assessment)
    }
    .instrument(span)
    .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
