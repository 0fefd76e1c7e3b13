//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted state of one monitored URL.
///
/// A single record per URL is kept and overwritten after every check. The
/// zero value stands in for a URL that has never been checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub url: String,
    /// Last HTTP status, or 503 when no response was obtained at all
    pub status: u16,
    pub description: String,
    pub body: String,
    pub response_time: String,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Consecutive successful checks
    pub success_count: u64,
    /// Consecutive failed checks
    pub failure_count: u64,
    pub last_notification_time: Option<DateTime<Utc>>,
    /// "is down" / "has recovered", written only when a notification fires
    pub change_description: String,
}
