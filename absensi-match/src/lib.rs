pub mod error;
pub mod face;
pub mod matcher;

// Re-export commonly used types
pub use error::MatchError;
pub use face::{euclidean_distance, Embedding};
pub use matcher::{
    match_probe, EnrolledIdentity, FaceMatch, MatchOutcome, NoMatchReason, DEFAULT_THRESHOLD,
};
