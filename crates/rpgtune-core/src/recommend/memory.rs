use crate::recommend::{RecommendError, Recommender, unsupported};
use crate::snapshot::{ResourceSnapshot, TargetOs};
use crate::units::{GB, KB, MB, bytes_to_canonical};

pub const SHARED_BUFFERS: &str = "shared_buffers";
pub const EFFECTIVE_CACHE_SIZE: &str = "effective_cache_size";
pub const MAINTENANCE_WORK_MEM: &str = "maintenance_work_mem";
pub const WORK_MEM: &str = "work_mem";

/// Connection count the work_mem budget is sized for.
pub const BASE_CONNS: u64 = 20;

const SHARED_BUFFERS_WINDOWS: u64 = 512 * MB;
const MAX_MAINTENANCE_WORK_MEM: u64 = 2 * GB;
/// Windows rejects 2GB and above for per-operation memory.
const MAX_WORK_MEM_WINDOWS: u64 = 2 * GB - MB;
/// 128MB of maintenance memory per GB of RAM.
const MAINTENANCE_WORK_MEM_DIVISOR: u64 = 8;
/// 32MB of work_mem per GB of RAM at [`BASE_CONNS`].
const WORK_MEM_DIVISOR: u64 = 32;
const MIN_WORK_MEM: u64 = 64 * KB;

const LABEL: &str = "memory";

/// Memory settings: shared buffers, cache size hint and per-operation memory.
pub struct MemoryRecommender<'a> {
    snapshot: &'a ResourceSnapshot,
}

impl<'a> MemoryRecommender<'a> {
    pub fn new(snapshot: &'a ResourceSnapshot) -> Self {
        Self { snapshot }
    }

    fn shared_buffers(&self) -> u64 {
        let quarter = self.snapshot.total_memory / 4;
        if self.snapshot.os == TargetOs::Windows {
            quarter.min(SHARED_BUFFERS_WINDOWS)
        } else {
            quarter
        }
    }

    fn effective_cache_size(&self) -> u64 {
        self.snapshot.total_memory / 4 * 3
    }

    fn maintenance_work_mem(&self) -> u64 {
        let value = self.snapshot.total_memory / MAINTENANCE_WORK_MEM_DIVISOR;
        let cap = if self.snapshot.os == TargetOs::Windows {
            MAX_WORK_MEM_WINDOWS
        } else {
            MAX_MAINTENANCE_WORK_MEM
        };
        value.min(cap)
    }

    /// RAM-proportional budget, scaled by how many connections share it and
    /// divided by the number of parallel workers one query may use. The
    /// connection count is the one recommended for max_connections.
    fn work_mem(&self) -> u64 {
        let conns = self.snapshot.resolved_max_connections().max(1);
        let cpu_factor = (self.snapshot.cpus as f64 / 2.0).round().max(1.0);

        let budget = (self.snapshot.total_memory / WORK_MEM_DIVISOR) as f64;
        let value = budget * BASE_CONNS as f64 / conns as f64 / cpu_factor;
        let mut value = (value as u64).max(MIN_WORK_MEM);
        if self.snapshot.os == TargetOs::Windows {
            value = value.min(MAX_WORK_MEM_WINDOWS);
        }
        value
    }
}

impl Recommender for MemoryRecommender<'_> {
    fn is_available(&self) -> bool {
        true
    }

    fn recommend(&self, key: &str) -> Result<Option<String>, RecommendError> {
        let bytes = match key {
            SHARED_BUFFERS => self.shared_buffers(),
            EFFECTIVE_CACHE_SIZE => self.effective_cache_size(),
            MAINTENANCE_WORK_MEM => self.maintenance_work_mem(),
            WORK_MEM => self.work_mem(),
            _ => return Err(unsupported(LABEL, key)),
        };
        Ok(Some(bytes_to_canonical(bytes)?))
    }
}
