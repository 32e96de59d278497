//! Visit model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the append-only visits log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: i64,
    pub member_id: i64,
    pub office_id: Option<i64>,
    /// When the visit was recorded
    pub visited_at_utc: DateTime<Utc>,
    pub purpose: Option<String>,
}

impl Visit {
    #[must_use]
    pub const fn new(member_id: i64, visited_at_utc: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            member_id,
            office_id: None,
            visited_at_utc,
            purpose: None,
        }
    }
}
