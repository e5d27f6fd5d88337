//! Utilities module for logging, metrics, charts and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - Binary classification metrics (accuracy, precision, recall, F1)
//! - SVG rendering of training curves and prediction grids
//! - Error handling types

pub mod charts;
pub mod error;
pub mod logging;
pub mod metrics;

// Re-export main types for convenience
pub use error::{PlantHealthError, Result};
pub use logging::init_logging;
pub use metrics::BinaryMetrics;

use std::time::Duration;

/// Render elapsed time as `12.3s`, `4m 05s` or `2h 07m`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..=59 => format!("{:.1}s", duration.as_secs_f64()),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

/// Group the digits of a count in threes: `5330564` -> `5,330,564`
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;

    let mut groups: Vec<&str> = Vec::new();
    if head > 0 {
        groups.push(&digits[..head]);
    }
    groups.extend(
        (head..digits.len())
            .step_by(3)
            .map(|start| &digits[start..start + 3]),
    );
    groups.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_units() {
        assert_eq!(format_duration(Duration::from_millis(4_300)), "4.3s");
        assert_eq!(format_duration(Duration::from_secs(245)), "4m 05s");
        assert_eq!(format_duration(Duration::from_secs(2 * 3600 + 7 * 60 + 30)), "2h 07m");
    }

    #[test]
    fn test_format_number_groups() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(4_049_564), "4,049,564");
        assert_eq!(format_number(164_097), "164,097");
    }
}
