use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::models::{ConsentHandle, HandleStatus};

/// Status as seen by a reader: past `expiresAt` a handle reads EXPIRED
/// whatever was stored
pub fn effective_status(handle: &ConsentHandle, now: DateTime<Utc>) -> HandleStatus {
    if handle.is_past_expiry(now) {
        HandleStatus::Expired
    } else {
        handle.status
    }
}

/// Whether the handle can still gate a consent creation
pub fn ensure_consumable(handle: &ConsentHandle, now: DateTime<Utc>) -> CoreResult<()> {
    match handle.status {
        HandleStatus::Used => Err(CoreError::new(ErrorKind::HandleAlreadyUsed, "Consent handle has already been used")),
        _ if handle.is_past_expiry(now) => Err(expired()),
        HandleStatus::Expired => Err(expired()),
        HandleStatus::Rejected => Err(CoreError::invalid_transition(HandleStatus::Rejected, HandleStatus::Used)),
        HandleStatus::Pending => Ok(()),
    }
}

fn expired() -> CoreError {
    CoreError::new(ErrorKind::HandleExpired, "Consent handle has expired")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn handle(status: HandleStatus) -> ConsentHandle {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ConsentHandle {
            handle_id: "h1".into(),
            tenant_id: "acme".into(),
            business_id: "biz-1".into(),
            template_id: "T1".into(),
            template_version: 1,
            customer_identifier: "cust-1".into(),
            status,
            created_at: created,
            expires_at: created + Duration::minutes(15),
        }
    }

    #[test]
    fn expiry_is_lazy_and_overrides_stored_status() {
        let h = handle(HandleStatus::Pending);
        assert_eq!(effective_status(&h, h.created_at + Duration::minutes(5)), HandleStatus::Pending);
        assert_eq!(effective_status(&h, h.expires_at), HandleStatus::Expired);
        let used = handle(HandleStatus::Used);
        assert_eq!(effective_status(&used, used.expires_at + Duration::minutes(1)), HandleStatus::Expired);
    }

    #[test]
    fn consumption_errors_are_distinct() {
        let now = handle(HandleStatus::Pending).created_at + Duration::minutes(1);
        assert!(ensure_consumable(&handle(HandleStatus::Pending), now).is_ok());
        assert_eq!(
            ensure_consumable(&handle(HandleStatus::Used), now).unwrap_err().kind(),
            ErrorKind::HandleAlreadyUsed
        );
        let late = now + Duration::hours(1);
        assert_eq!(
            ensure_consumable(&handle(HandleStatus::Pending), late).unwrap_err().kind(),
            ErrorKind::HandleExpired
        );
        assert_eq!(
            ensure_consumable(&handle(HandleStatus::Rejected), now).unwrap_err().kind(),
            ErrorKind::InvalidStatusTransition
        );
    }
}
