//! rpgtune-core - PostgreSQL/TimescaleDB configuration tuning.
//!
//! Provides:
//! - `units` - canonical byte and duration values (`2GB`, `15min`)
//! - `snapshot` - host resources, profile and version driving recommendations
//! - `settings` - tunable keys, their groups and the compiled line patterns
//! - `recommend` - one recommender per settings group
//! - `conf` - postgresql.conf line model, preload reconciliation, patching
//! - `decide` - per-setting visibility with a 5% tolerance
//! - `tune` - approval loop tying the above together
//! - `system` - memory, CPU, version and config file detection

pub mod conf;
pub mod decide;
pub mod recommend;
pub mod settings;
pub mod snapshot;
pub mod system;
pub mod tune;
pub mod units;
