use crate::recommend::{RecommendError, Recommender, unsupported};
use crate::snapshot::{Profile, ResourceSnapshot};
use crate::units::{GB, MB, TimeUnit, bytes_to_canonical, time_to_canonical};

pub const WAL_BUFFERS: &str = "wal_buffers";
pub const MIN_WAL_SIZE: &str = "min_wal_size";
pub const MAX_WAL_SIZE: &str = "max_wal_size";
pub const CHECKPOINT_TIMEOUT: &str = "checkpoint_timeout";

/// Above this much memory wal_buffers is pinned to [`WAL_BUFFERS_DEFAULT`].
const WAL_BUFFERS_THRESHOLD: u64 = 2 * GB;
const WAL_BUFFERS_DEFAULT: u64 = 16 * MB;
/// wal_buffers tracks 1/32 of shared_buffers, which is a quarter of memory.
const WAL_BUFFERS_DIVISOR: u64 = 128;

const DEFAULT_MIN_WAL_SIZE: u64 = 512 * MB;
const DEFAULT_MAX_WAL_SIZE: u64 = GB;
const PROMSCALE_MIN_WAL_SIZE: u64 = GB;
const PROMSCALE_MAX_WAL_SIZE: u64 = 2 * GB;

/// WAL segment size; disk-derived sizes are rounded to a multiple of it.
pub const WAL_SEGMENT_SIZE: u64 = 16 * MB;
/// Share of a dedicated WAL disk that max_wal_size may claim, in tenths.
const WAL_DISK_TENTHS: u64 = 6;

const PROMSCALE_CHECKPOINT_TIMEOUT_SECS: u64 = 15 * 60;

const LABEL: &str = "WAL";

/// Write-ahead log sizing.
pub struct WalRecommender<'a> {
    snapshot: &'a ResourceSnapshot,
}

impl<'a> WalRecommender<'a> {
    pub fn new(snapshot: &'a ResourceSnapshot) -> Self {
        Self { snapshot }
    }

    fn wal_buffers(&self) -> u64 {
        let memory = self.snapshot.total_memory;
        if memory < WAL_BUFFERS_THRESHOLD {
            memory / WAL_BUFFERS_DIVISOR
        } else {
            WAL_BUFFERS_DEFAULT
        }
    }

    /// Returns `(min_wal_size, max_wal_size)`.
    fn wal_sizes(&self) -> (u64, u64) {
        let disk = self.snapshot.wal_disk_size;
        if disk == 0 {
            return match self.snapshot.profile {
                Profile::Default => (DEFAULT_MIN_WAL_SIZE, DEFAULT_MAX_WAL_SIZE),
                Profile::Promscale => (PROMSCALE_MIN_WAL_SIZE, PROMSCALE_MAX_WAL_SIZE),
            };
        }

        let usable = disk / 10 * WAL_DISK_TENTHS;
        (round_to_segment(usable / 2), round_to_segment(usable))
    }

    fn checkpoint_timeout(&self) -> Result<Option<String>, RecommendError> {
        match self.snapshot.profile {
            Profile::Default => Ok(None),
            Profile::Promscale => Ok(Some(time_to_canonical(
                PROMSCALE_CHECKPOINT_TIMEOUT_SECS,
                TimeUnit::Seconds,
            )?)),
        }
    }
}

/// Rounds to the nearest whole WAL segment, never below one segment.
fn round_to_segment(bytes: u64) -> u64 {
    let segments = (bytes + WAL_SEGMENT_SIZE / 2) / WAL_SEGMENT_SIZE;
    segments.max(1) * WAL_SEGMENT_SIZE
}

impl Recommender for WalRecommender<'_> {
    fn is_available(&self) -> bool {
        true
    }

    fn recommend(&self, key: &str) -> Result<Option<String>, RecommendError> {
        let bytes = match key {
            WAL_BUFFERS => self.wal_buffers(),
            MIN_WAL_SIZE => self.wal_sizes().0,
            MAX_WAL_SIZE => self.wal_sizes().1,
            CHECKPOINT_TIMEOUT => return self.checkpoint_timeout(),
            _ => return Err(unsupported(LABEL, key)),
        };
        Ok(Some(bytes_to_canonical(bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::KB;

    fn rec(snap: &ResourceSnapshot, key: &str) -> Option<String> {
        WalRecommender::new(snap).recommend(key).unwrap()
    }

    #[test]
    fn test_wal_buffers_scales_below_threshold() {
        let snap = ResourceSnapshot::new(GB, 2, "16");
        assert_eq!(rec(&snap, WAL_BUFFERS).unwrap(), "8MB");

        let snap = ResourceSnapshot::new(100 * MB, 2, "16");
        assert_eq!(rec(&snap, WAL_BUFFERS).unwrap(), "800kB");
    }

    #[test]
    fn test_wal_buffers_pinned_above_threshold() {
        let snap = ResourceSnapshot::new(2 * GB, 2, "16");
        assert_eq!(rec(&snap, WAL_BUFFERS).unwrap(), "16MB");

        let snap = ResourceSnapshot::new(64 * GB, 2, "16");
        assert_eq!(rec(&snap, WAL_BUFFERS).unwrap(), "16MB");
    }

    #[test]
    fn test_default_wal_sizes() {
        let snap = ResourceSnapshot::new(8 * GB, 4, "16");
        assert_eq!(rec(&snap, MIN_WAL_SIZE).unwrap(), "512MB");
        assert_eq!(rec(&snap, MAX_WAL_SIZE).unwrap(), "1GB");

        let snap = snap.with_profile(Profile::Promscale);
        assert_eq!(rec(&snap, MIN_WAL_SIZE).unwrap(), "1GB");
        assert_eq!(rec(&snap, MAX_WAL_SIZE).unwrap(), "2GB");
    }

    #[test]
    fn test_wal_sizes_from_disk() {
        let snap = ResourceSnapshot::new(8 * GB, 4, "16").with_wal_disk_size(10 * GB);
        assert_eq!(rec(&snap, MIN_WAL_SIZE).unwrap(), "3GB");
        assert_eq!(rec(&snap, MAX_WAL_SIZE).unwrap(), "6GB");
    }

    #[test]
    fn test_wal_sizes_round_to_segment() {
        let snap = ResourceSnapshot::new(8 * GB, 4, "16").with_wal_disk_size(1000 * MB);
        assert_eq!(rec(&snap, MAX_WAL_SIZE).unwrap(), "608MB");
        assert_eq!(rec(&snap, MIN_WAL_SIZE).unwrap(), "304MB");
    }

    #[test]
    fn test_tiny_disk_keeps_one_segment() {
        assert_eq!(round_to_segment(KB), WAL_SEGMENT_SIZE);
    }

    #[test]
    fn test_checkpoint_timeout_by_profile() {
        let snap = ResourceSnapshot::new(8 * GB, 4, "16");
        assert_eq!(rec(&snap, CHECKPOINT_TIMEOUT), None);

        let snap = snap.with_profile(Profile::Promscale);
        assert_eq!(rec(&snap, CHECKPOINT_TIMEOUT).unwrap(), "15min");
    }
}
