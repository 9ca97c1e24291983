//! Query windows and their sample resolutions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Supported time windows for series queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    #[default]
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
}

impl Window {
    pub const ALL: [Window; 4] = [
        Window::FiveMinutes,
        Window::FifteenMinutes,
        Window::OneHour,
        Window::TwoHours,
    ];

    /// Total span covered by the window
    pub fn span(&self) -> Duration {
        match self {
            Window::FiveMinutes => Duration::from_secs(5 * 60),
            Window::FifteenMinutes => Duration::from_secs(15 * 60),
            Window::OneHour => Duration::from_secs(60 * 60),
            Window::TwoHours => Duration::from_secs(2 * 60 * 60),
        }
    }

    /// Fixed sample step for the window. Also bounds cache staleness.
    pub fn resolution(&self) -> Duration {
        match self {
            Window::FiveMinutes => Duration::from_secs(15),
            Window::FifteenMinutes => Duration::from_secs(15),
            Window::OneHour => Duration::from_secs(60),
            Window::TwoHours => Duration::from_secs(120),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::FiveMinutes => "5m",
            Window::FifteenMinutes => "15m",
            Window::OneHour => "1h",
            Window::TwoHours => "2h",
        }
    }

    /// Query range `[start, end]` in unix seconds, with `end` aligned to the
    /// resolution so that series queried for the same window share a grid.
    pub fn range_ending_at(&self, now_secs: i64) -> (i64, i64) {
        let step = self.resolution().as_secs() as i64;
        let end = now_secs - now_secs.rem_euclid(step);
        (end - self.span().as_secs() as i64, end)
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Window::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| format!("unsupported window: {} (expected 5m, 15m, 1h or 2h)", s))
    }
}
