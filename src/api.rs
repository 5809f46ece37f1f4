//! Transport-independent request boundary.
//!
//! Each handler takes a raw JSON body, talks to the collaborators and returns
//! a [`Response`] carrying an HTTP-style status class plus a JSON body. Client
//! mistakes never reach the directory or the store.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use absensi_match::{match_probe, Embedding, MatchError, MatchOutcome};

use crate::directory::UserDirectory;
use crate::storage::{self, FaceStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    ClientError,
    ServerError,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::ClientError => 400,
            Status::ServerError => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    pub body: Value,
}

impl Response {
    fn ok(body: Value) -> Self {
        Self {
            status: Status::Ok,
            body,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("user directory unavailable: {0:#}")]
    Directory(anyhow::Error),

    #[error("enrollment store failure: {0:#}")]
    Store(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::InvalidInput(_) => Status::ClientError,
            ApiError::Match(e) if e.is_client_error() => Status::ClientError,
            ApiError::Match(_) | ApiError::Directory(_) | ApiError::Store(_) => {
                Status::ServerError
            }
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        let status = err.status();
        match status {
            Status::ServerError => error!("{err}"),
            _ => warn!("rejected request: {err}"),
        }
        Self {
            status,
            body: json!({ "success": false, "message": err.to_string() }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecognizeRequest {
    pub face_embedding: Option<Vec<f32>>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub user_id: Option<String>,
    pub face_embedding: Option<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct MatchBody<'a> {
    id: &'a str,
    nama: &'a str,
    role: &'a str,
    nisn: Option<&'a str>,
    confidence: f32,
    distance: f32,
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::InvalidInput(format!("malformed request: {e}")))
}

fn probe_from(face_embedding: Option<Vec<f32>>) -> Result<Embedding, ApiError> {
    let values = face_embedding
        .ok_or_else(|| ApiError::InvalidInput("face_embedding is required".into()))?;
    let probe = Embedding::new(values);
    if probe.is_empty() {
        return Err(ApiError::InvalidInput("face_embedding is empty".into()));
    }
    if !probe.is_finite() {
        return Err(ApiError::InvalidInput(
            "face_embedding must contain finite numbers".into(),
        ));
    }
    Ok(probe)
}

fn threshold_from(requested: Option<f32>, default_threshold: f32) -> Result<f32, ApiError> {
    let threshold = requested.unwrap_or(default_threshold);
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(ApiError::InvalidInput(format!(
            "threshold must be a non-negative finite number, got {threshold}"
        )));
    }
    Ok(threshold)
}

fn try_recognize(
    body: &str,
    directory: &dyn UserDirectory,
    default_threshold: f32,
) -> Result<MatchOutcome, ApiError> {
    let request: RecognizeRequest = parse_body(body)?;
    let probe = probe_from(request.face_embedding)?;
    let threshold = threshold_from(request.threshold, default_threshold)?;

    let candidates = directory
        .enrolled_identities()
        .map_err(ApiError::Directory)?;
    info!(
        "matching probe ({} values) against {} enrolled face(s), threshold {:.3}",
        probe.len(),
        candidates.len(),
        threshold
    );

    Ok(match_probe(&probe, &candidates, threshold)?)
}

/// Resolve the identity behind a face embedding.
pub fn recognize(body: &str, directory: &dyn UserDirectory, default_threshold: f32) -> Response {
    match try_recognize(body, directory, default_threshold) {
        Ok(MatchOutcome::Matched(m)) => {
            info!(
                "matched {} ({}) distance {:.4}",
                m.identity_id, m.display_name, m.distance
            );
            let body = MatchBody {
                id: &m.identity_id,
                nama: &m.display_name,
                role: &m.role,
                nisn: m.nisn.as_deref(),
                confidence: m.confidence,
                distance: m.distance,
            };
            Response::ok(json!({ "success": true, "match": body }))
        }
        Ok(MatchOutcome::NoMatch(reason)) => {
            info!("no match: {}", reason.message());
            Response::ok(json!({ "success": false, "message": reason.message() }))
        }
        Err(err) => err.into(),
    }
}

fn try_enroll(body: &str, store: &dyn FaceStore) -> Result<(String, String), ApiError> {
    let request: EnrollRequest = parse_body(body)?;
    let user_id = request
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidInput("user_id is required".into()))?;
    storage::validate_identity_id(&user_id).map_err(|e| ApiError::InvalidInput(e.to_string()))?;
    let embedding = probe_from(request.face_embedding)?;

    let id = storage::enroll(store, &user_id, &embedding).map_err(ApiError::Store)?;
    Ok((user_id, id))
}

/// Register an additional face embedding for a user.
pub fn enroll(body: &str, store: &dyn FaceStore) -> Response {
    match try_enroll(body, store) {
        Ok((user_id, id)) => {
            info!("stored face {} for {}", id, user_id);
            Response::ok(json!({ "success": true, "id": id }))
        }
        Err(err) => err.into(),
    }
}
