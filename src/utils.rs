//! Shared utility functions.

/// Format a duration for log output, clamping negative spans (clock
/// adjustments) to zero.
///
/// # Examples
///
/// ```
/// use chrono::Duration;
/// use dzkeeper::utils::format_duration;
///
/// assert_eq!(format_duration(Duration::seconds(30)), "30s");
/// assert_eq!(format_duration(Duration::seconds(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::seconds(3660)), "1h 1m");
/// assert_eq!(format_duration(Duration::seconds(90000)), "1d 1h");
/// ```
pub fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Read a list file: one entry per line, blank lines and `#` comments
/// skipped, surrounding whitespace trimmed.
pub fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}
