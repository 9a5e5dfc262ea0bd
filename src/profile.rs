//! Host performance profiling.
//!
//! Constrained hosts run a degraded "lite" profile: lower analysis
//! resolution and FX sends reset to zero. Detection looks at available
//! parallelism only, which is cheap and stable for the lifetime of the
//! process.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Analysis window used for every tap while the lite profile is active.
pub const LITE_TAP_WINDOW: usize = 128;
/// Hosts reporting fewer cores than this get the lite profile.
pub const LITE_CORE_THRESHOLD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceProfile {
    #[default]
    Standard,
    Lite,
}

impl PerformanceProfile {
    /// Classify a host by core count. Hosts that cannot report one are
    /// assumed capable.
    pub fn from_cores(cores: Option<usize>) -> Self {
        match cores {
            Some(n) if n < LITE_CORE_THRESHOLD => Self::Lite,
            _ => Self::Standard,
        }
    }

    /// Inspect the current host.
    pub fn detect() -> Self {
        let cores = std::thread::available_parallelism().ok().map(|n| n.get());
        let profile = Self::from_cores(cores);
        log::info!(
            "performance profile: {} ({} core(s) available)",
            profile,
            cores.map_or_else(|| "?".to_string(), |n| n.to_string())
        );
        profile
    }

    pub fn is_lite(self) -> bool {
        matches!(self, Self::Lite)
    }
}

impl fmt::Display for PerformanceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Lite => write!(f, "lite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_count_threshold() {
        assert_eq!(PerformanceProfile::from_cores(Some(1)), PerformanceProfile::Lite);
        assert_eq!(PerformanceProfile::from_cores(Some(3)), PerformanceProfile::Lite);
        assert_eq!(PerformanceProfile::from_cores(Some(4)), PerformanceProfile::Standard);
        assert_eq!(PerformanceProfile::from_cores(Some(16)), PerformanceProfile::Standard);
    }

    #[test]
    fn test_unknown_core_count_stays_standard() {
        assert_eq!(PerformanceProfile::from_cores(None), PerformanceProfile::Standard);
    }

    #[test]
    fn test_detect_runs_on_this_host() {
        // Whatever the host is, detection must settle on one of the two
        let profile = PerformanceProfile::detect();
        assert!(matches!(
            profile,
            PerformanceProfile::Standard | PerformanceProfile::Lite
        ));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&PerformanceProfile::Lite).unwrap();
        assert_eq!(json, "\"lite\"");
        let back: PerformanceProfile = serde_json::from_str("\"standard\"").unwrap();
        assert_eq!(back, PerformanceProfile::Standard);
    }
}
