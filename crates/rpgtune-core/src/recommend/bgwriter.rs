use crate::recommend::{RecommendError, Recommender, unsupported};
use crate::snapshot::{Profile, ResourceSnapshot};
use crate::units::{TimeUnit, time_to_canonical};

pub const BGWRITER_DELAY: &str = "bgwriter_delay";
pub const BGWRITER_LRU_MAXPAGES: &str = "bgwriter_lru_maxpages";

const PROMSCALE_BGWRITER_DELAY_MS: u64 = 10;
const PROMSCALE_BGWRITER_LRU_MAXPAGES: u64 = 100_000;

const LABEL: &str = "background writer";

/// Background writer pacing. The server defaults suit general workloads, so
/// only the Promscale profile recommends anything.
pub struct BgwriterRecommender<'a> {
    snapshot: &'a ResourceSnapshot,
}

impl<'a> BgwriterRecommender<'a> {
    pub fn new(snapshot: &'a ResourceSnapshot) -> Self {
        Self { snapshot }
    }
}

impl Recommender for BgwriterRecommender<'_> {
    fn is_available(&self) -> bool {
        true
    }

    fn recommend(&self, key: &str) -> Result<Option<String>, RecommendError> {
        if key != BGWRITER_DELAY && key != BGWRITER_LRU_MAXPAGES {
            return Err(unsupported(LABEL, key));
        }
        if self.snapshot.profile == Profile::Default {
            return Ok(None);
        }

        let value = match key {
            BGWRITER_DELAY => {
                time_to_canonical(PROMSCALE_BGWRITER_DELAY_MS, TimeUnit::Milliseconds)?
            }
            _ => PROMSCALE_BGWRITER_LRU_MAXPAGES.to_string(),
        };
        Ok(Some(value))
    }
}
