//! Pure per-attempt deadline selection.
//!
//! Small source files get a tight deadline so the watchdog can retry
//! quickly; larger, non-source assets get more slack. After the first
//! two attempts every class falls back to one shared default.

use std::time::Duration;

const SOURCE_EXTENSIONS: &[&str] = &[
    "js", "ts", "py", "go", "java", "c", "cc", "cpp", "h", "rb", "sh", "html", "css", "json",
    "yaml", "xml", "md",
];

/// Tunable durations backing [`attempt_timeout`]. The staircase shape
/// (tighter, then looser, then default) is contractual; the exact
/// values are configuration.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub source_timeouts: [Duration; 2],
    pub non_source_timeouts: [Duration; 2],
    pub default_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            source_timeouts: [Duration::from_secs(5), Duration::from_secs(15)],
            non_source_timeouts: [Duration::from_secs(30), Duration::from_secs(60)],
            default_timeout: Duration::from_secs(120),
        }
    }
}

/// Returns true if `filename`'s extension marks it as likely to be a
/// small source file rather than a large binary asset.
pub fn is_source_like(filename: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SOURCE_EXTENSIONS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
}

/// Selects the deadline for `attempt` (zero-based) of a fetch of
/// `filename`.
pub fn attempt_timeout(filename: &str, attempt: usize, cfg: &TimeoutConfig) -> Duration {
    let pair = if is_source_like(filename) {
        &cfg.source_timeouts
    } else {
        &cfg.non_source_timeouts
    };

    match attempt {
        0 => pair[0],
        1 => pair[1],
        _ => cfg.default_timeout,
    }
}
