//! Shared utilities for scales-sensors

use std::time::Duration;

/// Format a polling interval to a human readable string
pub fn format_interval(interval: Duration) -> String {
    let seconds = interval.as_secs();
    let millis = interval.subsec_millis();

    if seconds == 0 {
        format!("{}ms", millis)
    } else if seconds < 60 {
        if millis == 0 {
            format!("{}s", seconds)
        } else {
            format!("{}.{:03}s", seconds, millis)
        }
    } else if seconds < 3600 {
        let mins = seconds / 60;
        let secs = seconds % 60;
        if secs == 0 {
            format!("{}m", mins)
        } else {
            format!("{}m {}s", mins, secs)
        }
    } else {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        if mins == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, mins)
        }
    }
}
