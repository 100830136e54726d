//! Snapshot naming.
//!
//! Destination names are derived from the configured strftime pattern, or
//! from `custom/<label>` for labeled manual runs. A malformed pattern never
//! fails a run: the canonical fallback format is used instead and the caller
//! is told so it can surface a warning.

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDateTime;

/// Pattern used when the configured one does not parse.
pub const FALLBACK_DATE_FORMAT: &str = "%d%m%Y-%H%M%S";

/// Derives deterministic destination names for one backup run.
#[derive(Debug, Clone)]
pub struct SnapshotNamer {
    date_format: String,
}

/// A derived name, plus whether the fallback pattern had to be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotName {
    pub value: String,
    pub used_fallback: bool,
}

impl SnapshotNamer {
    pub fn new(date_format: impl Into<String>) -> Self {
        Self {
            date_format: date_format.into(),
        }
    }

    /// Name for a run's aggregated destination: `custom/<label>` for a
    /// labeled manual run (label taken verbatim, callers sanitize), the
    /// formatted timestamp otherwise.
    pub fn run_name(&self, now: NaiveDateTime, label: Option<&str>) -> SnapshotName {
        match label {
            Some(label) => SnapshotName {
                value: format!("custom/{label}"),
                used_fallback: false,
            },
            None => self.dated(now),
        }
    }

    /// Name for one target's entry in per-target mode: `<id>-<date>`, so
    /// multiple targets never collide inside the same run.
    pub fn target_name(&self, id: &str, now: NaiveDateTime) -> SnapshotName {
        let dated = self.dated(now);
        SnapshotName {
            value: format!("{id}-{}", dated.value),
            used_fallback: dated.used_fallback,
        }
    }

    fn dated(&self, now: NaiveDateTime) -> SnapshotName {
        match checked_format(&self.date_format, now) {
            Some(value) => SnapshotName {
                value,
                used_fallback: false,
            },
            None => SnapshotName {
                value: now.format(FALLBACK_DATE_FORMAT).to_string(),
                used_fallback: true,
            },
        }
    }
}

/// Whether a label is usable as a single path component under `custom/`.
/// Separators and traversal components would let a label escape the backup
/// root.
pub fn is_safe_label(label: &str) -> bool {
    !label.is_empty() && !label.contains(['/', '\\']) && label != "." && label != ".."
}

/// Format `now` with a strftime pattern, returning `None` if the pattern
/// contains specifiers chrono does not recognize or cannot render from a
/// naive timestamp (offset specifiers like `%z` parse fine but have no
/// value to print).
fn checked_format(pattern: &str, now: NaiveDateTime) -> Option<String> {
    use std::fmt::Write;

    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    // Render through write! so a formatting failure surfaces as an Err
    // instead of the panic that to_string() would raise.
    let mut out = String::new();
    match write!(out, "{}", now.format_with_items(items.into_iter())) {
        Ok(()) => Some(out),
        Err(_) => None,
    }
}
