//! Member model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::utc_now;

/// A registered member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Primary key
    pub id: i64,
    /// Printed member number; immutable once issued
    pub member_number: String,
    pub first_name: String,
    pub last_name: String,
    /// Category reference
    pub member_type_id: Option<i64>,
    /// Home office reference
    pub office_id: Option<i64>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// File name of the member photo inside the photos directory
    pub photo_file_name: Option<String>,
    pub is_active: bool,
    pub created_at_utc: DateTime<Utc>,
    /// Last modification time, advanced on every write
    pub updated_at_utc: DateTime<Utc>,
}

impl Member {
    /// Create an active member stamped with the current time
    #[must_use]
    pub fn new(
        id: i64,
        member_number: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        let now = utc_now();
        Self {
            id,
            member_number: member_number.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            member_type_id: None,
            office_id: None,
            email: None,
            phone: None,
            photo_file_name: None,
            is_active: true,
            created_at_utc: now,
            updated_at_utc: now,
        }
    }

    /// Member number plus last name, as shown in merge reports
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.member_number, self.last_name)
    }
}
