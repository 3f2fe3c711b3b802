use crate::error::{CoreError, CoreResult};
use crate::models::TemplateStatus;

/// DRAFT -> PUBLISHED -> ARCHIVED, forward only. A draft may be archived
/// without ever being published.
pub fn can_transition(from: TemplateStatus, to: TemplateStatus) -> bool {
    use TemplateStatus::*;
    matches!((from, to), (Draft, Published) | (Published, Archived) | (Draft, Archived))
}

pub fn transition(from: TemplateStatus, to: TemplateStatus) -> CoreResult<TemplateStatus> {
    if can_transition(from, to) {
        Ok(to)
    } else {
        Err(CoreError::invalid_transition(from, to))
    }
}

/// Status a freshly derived version starts in. Archived templates are closed
/// to further versions.
pub fn status_for_new_version(current: TemplateStatus) -> CoreResult<TemplateStatus> {
    match current {
        TemplateStatus::Archived => Err(CoreError::invalid_transition(current, TemplateStatus::Draft)),
        _ => Ok(TemplateStatus::Draft),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use TemplateStatus::*;

    #[test]
    fn forward_only() {
        assert!(can_transition(Draft, Published));
        assert!(can_transition(Published, Archived));
        assert!(can_transition(Draft, Archived));
        assert!(!can_transition(Published, Draft));
        assert!(!can_transition(Archived, Published));
        assert!(!can_transition(Published, Published));
        assert_eq!(transition(Archived, Draft).unwrap_err().kind(), ErrorKind::InvalidStatusTransition);
    }

    #[test]
    fn new_versions_reenter_draft() {
        assert_eq!(status_for_new_version(Published).unwrap(), Draft);
        assert_eq!(status_for_new_version(Draft).unwrap(), Draft);
        assert!(status_for_new_version(Archived).is_err());
    }
}
