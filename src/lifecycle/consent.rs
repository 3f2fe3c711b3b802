use crate::error::{CoreError, CoreResult};
use crate::models::{ConsentStatus, PreferenceChoice, PreferenceStatus};

/// ACTIVE when anything was accepted, or when every preference was
/// explicitly declined ("reject all"). Partial or pending choices and an
/// empty preference set give INACTIVE.
pub fn derive_status(preferences: &[PreferenceStatus]) -> ConsentStatus {
    if preferences.is_empty() {
        return ConsentStatus::Inactive;
    }
    let any_accepted = preferences.iter().any(|p| p.status == PreferenceChoice::Accepted);
    let all_declined = preferences.iter().all(|p| p.status == PreferenceChoice::NotAccepted);
    if any_accepted || all_declined {
        ConsentStatus::Active
    } else {
        ConsentStatus::Inactive
    }
}

pub fn is_terminal(status: ConsentStatus) -> bool {
    matches!(status, ConsentStatus::Expired | ConsentStatus::Revoked)
}

/// Only revocation can be requested by a user; EXPIRED is set by the sweeper
pub fn user_transition(from: ConsentStatus, to: ConsentStatus) -> CoreResult<ConsentStatus> {
    if to != ConsentStatus::Revoked || is_terminal(from) {
        return Err(CoreError::invalid_transition(from, to));
    }
    Ok(to)
}

/// Preferences may only change while the consent is still live
pub fn ensure_mutable(status: ConsentStatus) -> CoreResult<()> {
    if is_terminal(status) {
        return Err(CoreError::invalid_transition(status, ConsentStatus::Active));
    }
    Ok(())
}
