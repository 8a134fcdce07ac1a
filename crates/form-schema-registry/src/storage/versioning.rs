//! Version tag generation
//!
//! Tags are 20 digit zero padded nanosecond timestamps so that the
//! lexical order of tags equals their chronological order. A tag is
//! always strictly greater than the newest existing tag of the same id,
//! even when the wall clock stalls or steps backwards.

use chrono::Utc;

/// Width of a generated tag
pub const VERSION_TAG_WIDTH: usize = 20;

/// Format a sequence number as a version tag
pub fn format_version_tag(sequence: u128) -> String {
    format!("{:0width$}", sequence, width = VERSION_TAG_WIDTH)
}

/// Next tag for an id whose newest existing tag is `latest`
pub fn next_version_tag(latest: Option<&str>) -> String {
    let now = Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n.max(0) as u128)
        .unwrap_or_default();

    let floor = latest
        .and_then(|tag| tag.parse::<u128>().ok())
        .map(|last| last + 1)
        .unwrap_or_default();

    format_version_tag(now.max(floor))
}

/// Sort tags oldest first
pub fn sort_version_tags(tags: &mut [String]) {
    tags.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
}
