use crate::recommend::{RecommendError, Recommender, unsupported};
use crate::snapshot::{Profile, ResourceSnapshot};
use crate::units::GB;

pub const DEFAULT_STATISTICS_TARGET: &str = "default_statistics_target";
pub const RANDOM_PAGE_COST: &str = "random_page_cost";
pub const CHECKPOINT_COMPLETION_TARGET: &str = "checkpoint_completion_target";
pub const MAX_CONNECTIONS: &str = "max_connections";
pub const MAX_LOCKS_PER_TRANSACTION: &str = "max_locks_per_transaction";
pub const AUTOVACUUM_MAX_WORKERS: &str = "autovacuum_max_workers";
pub const AUTOVACUUM_NAPTIME: &str = "autovacuum_naptime";
pub const EFFECTIVE_IO_CONCURRENCY: &str = "effective_io_concurrency";

const STATISTICS_TARGET_DEFAULT: &str = "500";
const STATISTICS_TARGET_PROMSCALE: &str = "100";
const RANDOM_PAGE_COST_DEFAULT: &str = "1.1";
const CHECKPOINT_COMPLETION_TARGET_DEFAULT: &str = "0.9";
const AUTOVACUUM_MAX_WORKERS_DEFAULT: &str = "10";
const AUTOVACUUM_NAPTIME_DEFAULT: &str = "10";
const IO_CONCURRENCY_PRE_13: &str = "200";
const IO_CONCURRENCY: &str = "256";

/// Indexed by floor(log2(memory in GB)).
const MAX_LOCKS_TIERS: [u64; 5] = [64, 128, 256, 512, 1024];

const LABEL: &str = "miscellaneous";

/// Planner, checkpoint, autovacuum and connection settings.
pub struct MiscRecommender<'a> {
    snapshot: &'a ResourceSnapshot,
}

impl<'a> MiscRecommender<'a> {
    pub fn new(snapshot: &'a ResourceSnapshot) -> Self {
        Self { snapshot }
    }

    fn max_locks_per_transaction(&self) -> u64 {
        let gigs = self.snapshot.total_memory / GB;
        let tier = if gigs <= 1 { 0 } else { gigs.ilog2() as usize };
        MAX_LOCKS_TIERS[tier.min(MAX_LOCKS_TIERS.len() - 1)]
    }
}

impl Recommender for MiscRecommender<'_> {
    fn is_available(&self) -> bool {
        true
    }

    fn recommend(&self, key: &str) -> Result<Option<String>, RecommendError> {
        let value = match key {
            DEFAULT_STATISTICS_TARGET => match self.snapshot.profile {
                Profile::Default => STATISTICS_TARGET_DEFAULT.to_string(),
                Profile::Promscale => STATISTICS_TARGET_PROMSCALE.to_string(),
            },
            RANDOM_PAGE_COST => RANDOM_PAGE_COST_DEFAULT.to_string(),
            CHECKPOINT_COMPLETION_TARGET => CHECKPOINT_COMPLETION_TARGET_DEFAULT.to_string(),
            MAX_CONNECTIONS => self.snapshot.resolved_max_connections().to_string(),
            MAX_LOCKS_PER_TRANSACTION => self.max_locks_per_transaction().to_string(),
            AUTOVACUUM_MAX_WORKERS => AUTOVACUUM_MAX_WORKERS_DEFAULT.to_string(),
            AUTOVACUUM_NAPTIME => AUTOVACUUM_NAPTIME_DEFAULT.to_string(),
            EFFECTIVE_IO_CONCURRENCY => {
                if self.snapshot.pg_major() < 13 {
                    IO_CONCURRENCY_PRE_13.to_string()
                } else {
                    IO_CONCURRENCY.to_string()
                }
            }
            _ => return Err(unsupported(LABEL, key)),
        };
        Ok(Some(value))
    }
}
