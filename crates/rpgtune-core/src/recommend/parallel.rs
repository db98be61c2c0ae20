use crate::recommend::{RecommendError, Recommender, unsupported};
use crate::snapshot::ResourceSnapshot;

pub const MAX_BACKGROUND_WORKERS: &str = "timescaledb.max_background_workers";
pub const MAX_WORKER_PROCESSES: &str = "max_worker_processes";
pub const MAX_PARALLEL_WORKERS_PER_GATHER: &str = "max_parallel_workers_per_gather";
pub const MAX_PARALLEL_WORKERS: &str = "max_parallel_workers";

/// Worker slots PostgreSQL keeps for itself (logical replication launcher,
/// TimescaleDB scheduler and one spare).
pub const RESERVED_WORKER_PROCESSES: usize = 3;

const LABEL: &str = "parallelism";

/// Worker pool sizing. Only meaningful on multi-core hosts.
pub struct ParallelRecommender<'a> {
    snapshot: &'a ResourceSnapshot,
}

impl<'a> ParallelRecommender<'a> {
    pub fn new(snapshot: &'a ResourceSnapshot) -> Self {
        Self { snapshot }
    }
}

impl Recommender for ParallelRecommender<'_> {
    fn is_available(&self) -> bool {
        self.snapshot.cpus > 1
    }

    fn recommend(&self, key: &str) -> Result<Option<String>, RecommendError> {
        let cpus = self.snapshot.cpus;
        let value = match key {
            MAX_BACKGROUND_WORKERS => self.snapshot.max_background_workers,
            MAX_WORKER_PROCESSES => {
                RESERVED_WORKER_PROCESSES + self.snapshot.max_background_workers + cpus
            }
            MAX_PARALLEL_WORKERS_PER_GATHER => (cpus as f64 / 2.0).round() as usize,
            MAX_PARALLEL_WORKERS => cpus,
            _ => return Err(unsupported(LABEL, key)),
        };
        Ok(Some(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::GB;

    #[test]
    fn test_single_cpu_unavailable() {
        let snap = ResourceSnapshot::new(8 * GB, 1, "16");
        assert!(!ParallelRecommender::new(&snap).is_available());

        let snap = ResourceSnapshot::new(8 * GB, 2, "16");
        assert!(ParallelRecommender::new(&snap).is_available());
    }

    #[test]
    fn test_four_cpus() {
        let snap = ResourceSnapshot::new(8 * GB, 4, "16");
        let r = ParallelRecommender::new(&snap);
        let get = |k| r.recommend(k).unwrap().unwrap();
        assert_eq!(get(MAX_BACKGROUND_WORKERS), "16");
        assert_eq!(get(MAX_WORKER_PROCESSES), "23");
        assert_eq!(get(MAX_PARALLEL_WORKERS_PER_GATHER), "2");
        assert_eq!(get(MAX_PARALLEL_WORKERS), "4");
    }

    #[test]
    fn test_odd_cpu_count_rounds_up() {
        let snap = ResourceSnapshot::new(8 * GB, 5, "16").with_max_background_workers(8);
        let r = ParallelRecommender::new(&snap);
        assert_eq!(r.recommend(MAX_PARALLEL_WORKERS_PER_GATHER).unwrap().unwrap(), "3");
        assert_eq!(r.recommend(MAX_WORKER_PROCESSES).unwrap().unwrap(), "16");
    }

    #[test]
    fn test_unsupported_key() {
        let snap = ResourceSnapshot::new(8 * GB, 4, "16");
        assert!(ParallelRecommender::new(&snap).recommend("work_mem").is_err());
    }
}
