// ============================================================================
// Timestamp Calendar Configuration
// ============================================================================

use crate::constants::*;
use std::time::Duration;

/// Timestamping authorities and request limits
#[derive(Clone, Debug)]
pub struct CalendarConfig {
    /// Calendar base URLs; the same digest is fanned out to all of them
    pub urls: Vec<String>,
    /// Upper bound for one proof request across all calendars
    pub request_timeout: Duration,
    /// User-Agent header sent to calendars
    pub user_agent: String,
}

impl CalendarConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            urls: std::env::var("CALENDAR_URLS")
                .ok()
                .map(|v| parse_url_list(&v))
                .filter(|urls| !urls.is_empty())
                .unwrap_or_else(|| vec![DEFAULT_CALENDAR_URL.to_string()]),
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Split a comma-separated URL list, trimming whitespace and trailing slashes
pub(crate) fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|u| u.trim().trim_end_matches('/'))
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}
