//! Office model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::utc_now;

/// A physical office a member can be attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Office {
    /// Primary key, assigned by the site that created the row
    pub id: i64,
    /// Short unique code (e.g. "HQ")
    pub code: String,
    /// Display name
    pub name: String,
    /// Postal address
    pub address: Option<String>,
    /// Whether the office still accepts visits
    pub is_active: bool,
    /// Last modification time, advanced on every write
    pub updated_at_utc: DateTime<Utc>,
}

impl Office {
    /// Create an active office stamped with the current time
    #[must_use]
    pub fn new(id: i64, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            address: None,
            is_active: true,
            updated_at_utc: utc_now(),
        }
    }

    /// Human-readable identifier used in merge reports
    #[must_use]
    pub fn label(&self) -> String {
        self.code.clone()
    }
}
