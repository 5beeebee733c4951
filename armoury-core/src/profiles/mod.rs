//! Performance profiles
//!
//! Named bundles of per-facet settings, merged from built-ins, the settings
//! file and profile directories, and applied to the hardware together.

mod manager;
mod store;
mod types;

pub use manager::{ApplyReport, ProfileListener, ProfileManager};
pub use store::{load_profile_dir, load_profile_file, ProfileDirs, ProfileStore};
pub use types::{builtin_profiles, is_builtin, FanCurve, PerformanceProfile, RgbConfig, BUILTIN_NAMES};
