use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandleStatus {
    Pending,
    Used,
    Expired,
    Rejected,
}

impl HandleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleStatus::Pending => "PENDING",
            HandleStatus::Used => "USED",
            HandleStatus::Expired => "EXPIRED",
            HandleStatus::Rejected => "REJECTED",
        }
    }
}

/// Short-lived token gating the creation of one consent. Not versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentHandle {
    #[serde(rename = "documentId")]
    pub handle_id: String,
    pub tenant_id: String,
    pub business_id: String,
    pub template_id: String,
    pub template_version: u32,
    pub customer_identifier: String,
    pub status: HandleStatus,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl ConsentHandle {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
