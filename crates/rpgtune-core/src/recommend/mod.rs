//! Per-category recommendation strategies.
//!
//! Each category implements [`Recommender`], a pure function of the
//! [`ResourceSnapshot`](crate::snapshot::ResourceSnapshot) it was built from.
//! `Ok(None)` means the profile deliberately leaves the key alone.

pub mod bgwriter;
pub mod memory;
pub mod misc;
pub mod parallel;
pub mod wal;

pub use bgwriter::BgwriterRecommender;
pub use memory::MemoryRecommender;
pub use misc::MiscRecommender;
pub use parallel::ParallelRecommender;
pub use wal::WalRecommender;

use crate::units::FormatError;

/// Error returned by a recommender.
#[derive(Debug, Clone, PartialEq)]
pub enum RecommendError {
    /// The key is not part of this category. Indicates a broken key table.
    UnsupportedKey { group: &'static str, key: String },
    /// A computed value could not be rendered in canonical form.
    Format(FormatError),
}

impl std::fmt::Display for RecommendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendError::UnsupportedKey { group, key } => {
                write!(f, "{} recommender has no value for key '{}'", group, key)
            }
            RecommendError::Format(e) => write!(f, "recommendation not representable: {}", e),
        }
    }
}

impl std::error::Error for RecommendError {}

impl From<FormatError> for RecommendError {
    fn from(e: FormatError) -> Self {
        RecommendError::Format(e)
    }
}

pub trait Recommender {
    /// Whether this category can be tuned at all for the snapshot.
    fn is_available(&self) -> bool;

    /// Recommended value for `key`, or `None` when the active profile leaves
    /// the key untouched.
    fn recommend(&self, key: &str) -> Result<Option<String>, RecommendError>;
}

pub(crate) fn unsupported(group: &'static str, key: &str) -> RecommendError {
    RecommendError::UnsupportedKey {
        group,
        key: key.to_string(),
    }
}
