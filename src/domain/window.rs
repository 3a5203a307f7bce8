//! Minute-window identifiers and counter key handling
//!
//! Window counters are keyed by `{prefix}:{endpoint_id}:{credential_id}:{window}`
//! where `window` is the UTC minute formatted as `YYYYMMDDHHMM`. The
//! format doubles as the aggregation boundary: a window is safe to
//! drain once its end has passed.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Timelike, Utc};
use uuid::Uuid;

const WINDOW_FORMAT: &str = "%Y%m%d%H%M";

/// A fixed one-minute metering window, UTC-aligned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MinuteWindow {
    start: DateTime<Utc>,
}

impl MinuteWindow {
    /// The window containing the given instant
    pub fn containing(at: DateTime<Utc>) -> Self {
        let start = at
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(at);
        Self { start }
    }

    /// The current window
    pub fn current() -> Self {
        Self::containing(Utc::now())
    }

    /// Parse a `YYYYMMDDHHMM` window id
    pub fn parse(id: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(id, WINDOW_FORMAT)
            .ok()
            .map(|start| Self {
                start: start.and_utc(),
            })
    }

    /// The `YYYYMMDDHHMM` id for this window
    pub fn id(&self) -> String {
        self.start.format(WINDOW_FORMAT).to_string()
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + TimeDelta::minutes(1)
    }

    /// True once no live request can still write into this window
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.end()
    }
}

/// Build the counter key for one (endpoint, credential, window) triple
pub fn counter_key(prefix: &str, endpoint_id: Uuid, credential_id: Uuid, window: MinuteWindow) -> String {
    format!("{}:{}:{}:{}", prefix, endpoint_id, credential_id, window.id())
}

/// Parse a counter key back into its (endpoint, credential, window)
/// triple. Keys that do not match the expected shape yield `None` and
/// are skipped by the aggregator.
pub fn parse_counter_key(
    prefix: &str,
    key: &str,
) -> Option<(Uuid, Uuid, MinuteWindow)> {
    let rest = key.strip_prefix(prefix)?.strip_prefix(':')?;
    let mut parts = rest.split(':');
    let endpoint_id = Uuid::parse_str(parts.next()?).ok()?;
    let credential_id = Uuid::parse_str(parts.next()?).ok()?;
    let window = MinuteWindow::parse(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some((endpoint_id, credential_id, window))
}
