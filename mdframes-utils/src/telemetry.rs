//! Scoped timing for pipeline stages.
//!
//! A [`TimingGuard`] records when it was created and logs the elapsed time on drop, but only
//! when telemetry has been switched on with [`configure`] and the logger accepts the level on
//! the [`TELEMETRY_TARGET`] target. With telemetry off a guard is a single `Instant`.

use std::{
    borrow::Cow,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use log::{Level, LevelFilter, log, log_enabled};

/// Log target used for every timing record.
pub const TELEMETRY_TARGET: &str = "mdframes::telemetry";

static ENABLED: AtomicBool = AtomicBool::new(false);
static MAX_LEVEL: AtomicUsize = AtomicUsize::new(0);

/// Logs how long a scope took when dropped.
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    /// Elapsed time since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if self.active {
            log!(
                target: TELEMETRY_TARGET,
                self.level,
                "{} completed in {:.2?}",
                self.label,
                self.elapsed()
            );
        }
    }
}

/// Start timing `label`; the record is emitted at `level` if telemetry allows it.
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    let active = allows(level) && log_enabled!(target: TELEMETRY_TARGET, level);
    TimingGuard {
        label: label.into(),
        level,
        start: Instant::now(),
        active,
    }
}

/// Switch telemetry on or off and cap the level at which guards report.
pub fn configure(enabled: bool, level: LevelFilter) {
    ENABLED.store(enabled, Ordering::Relaxed);
    MAX_LEVEL.store(level as usize, Ordering::Relaxed);
}

/// Whether telemetry is currently switched on.
pub fn telemetry_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

fn allows(level: Level) -> bool {
    telemetry_enabled() && (level as usize) <= MAX_LEVEL.load(Ordering::Relaxed)
}

/// Parse a level name as written in settings files; unknown names fall back to `debug`.
pub fn parse_level_filter(value: &str) -> LevelFilter {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Debug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_names() {
        assert_eq!(parse_level_filter("TRACE"), LevelFilter::Trace);
        assert_eq!(parse_level_filter(" warning "), LevelFilter::Warn);
        assert_eq!(parse_level_filter("off"), LevelFilter::Off);
        assert_eq!(parse_level_filter("bogus"), LevelFilter::Debug);
    }

    #[test]
    fn guard_measures_elapsed_time() {
        let guard = timing_guard("test", Level::Trace);
        std::thread::sleep(Duration::from_millis(2));
        assert!(guard.elapsed() >= Duration::from_millis(2));
    }
}
