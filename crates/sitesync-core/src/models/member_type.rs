//! Member category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::utc_now;

/// A member category (e.g. staff, volunteer, guest)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberType {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    /// Badge accent color as a hex string
    pub badge_color: Option<String>,
    pub updated_at_utc: DateTime<Utc>,
}

impl MemberType {
    #[must_use]
    pub fn new(id: i64, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            description: None,
            badge_color: None,
            updated_at_utc: utc_now(),
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.code.clone()
    }
}
