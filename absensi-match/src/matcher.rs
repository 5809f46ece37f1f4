use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::MatchError;
use crate::face::{euclidean_distance, Embedding};

/// Acceptance threshold used when the caller does not configure one.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// One registered face eligible for matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledIdentity {
    pub identity_id: String,
    pub display_name: String,
    pub role: String,
    #[serde(default)]
    pub nisn: Option<String>,
    #[serde(default)]
    pub embedding: Option<Embedding>,
}

/// Projection of the accepted candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    pub identity_id: String,
    pub display_name: String,
    pub role: String,
    pub nisn: Option<String>,
    pub distance: f32,
    /// `1 - distance`. Display value only, never clamped.
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchReason {
    NoEnrolledFaces,
    NotRecognized,
}

impl NoMatchReason {
    pub fn message(&self) -> &'static str {
        match self {
            NoMatchReason::NoEnrolledFaces => "no enrolled faces",
            NoMatchReason::NotRecognized => "face not recognized",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(FaceMatch),
    NoMatch(NoMatchReason),
}

impl MatchOutcome {
    pub fn matched(&self) -> Option<&FaceMatch> {
        match self {
            MatchOutcome::Matched(m) => Some(m),
            MatchOutcome::NoMatch(_) => None,
        }
    }
}

fn validate(probe: &Embedding, threshold: f32) -> Result<(), MatchError> {
    if probe.is_empty() {
        return Err(MatchError::InvalidInput("probe embedding is empty".into()));
    }
    if !probe.is_finite() {
        return Err(MatchError::InvalidInput(
            "probe embedding contains non-finite values".into(),
        ));
    }
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(MatchError::InvalidInput(format!(
            "threshold must be a non-negative finite number, got {threshold}"
        )));
    }
    Ok(())
}

/// Find the enrolled identity closest to `probe` whose distance is strictly
/// below `threshold`.
///
/// Candidates are scanned in input order and ties keep the first candidate.
/// Candidates without an embedding are skipped; a candidate whose embedding
/// length differs from the probe's aborts the whole call.
pub fn match_probe(
    probe: &Embedding,
    candidates: &[EnrolledIdentity],
    threshold: f32,
) -> Result<MatchOutcome, MatchError> {
    if candidates.is_empty() {
        return Ok(MatchOutcome::NoMatch(NoMatchReason::NoEnrolledFaces));
    }

    validate(probe, threshold)?;

    // `threshold` stays the acceptance bound; `best_distance` is the running minimum.
    let mut best_distance = threshold;
    let mut best: Option<FaceMatch> = None;

    for candidate in candidates {
        let Some(embedding) = candidate.embedding.as_ref() else {
            debug!("skipping {}: no embedding", candidate.identity_id);
            continue;
        };

        let distance = euclidean_distance(probe, embedding).map_err(|e| {
            warn!("candidate {}: {}", candidate.identity_id, e);
            e
        })?;
        debug!("candidate {}: distance {:.4}", candidate.identity_id, distance);

        if distance < best_distance {
            best_distance = distance;
            best = Some(FaceMatch {
                identity_id: candidate.identity_id.clone(),
                display_name: candidate.display_name.clone(),
                role: candidate.role.clone(),
                nisn: candidate.nisn.clone(),
                distance,
                confidence: 1.0 - distance,
            });
        }
    }

    Ok(match best {
        Some(m) => MatchOutcome::Matched(m),
        None => MatchOutcome::NoMatch(NoMatchReason::NotRecognized),
    })
}
