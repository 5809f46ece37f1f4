pub mod api;
pub mod config;
pub mod directory;
pub mod storage;

// Re-export matcher types for convenience
pub use absensi_match::{
    euclidean_distance, match_probe, Embedding, EnrolledIdentity, FaceMatch, MatchError,
    MatchOutcome, NoMatchReason,
};
