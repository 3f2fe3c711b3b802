pub mod check;
pub mod checks;
pub mod validator;

pub use check::{CheckContext, CheckPhase, Finding, IntegrityCheck, Severity};
pub use validator::{AuditReport, IntegrityValidator};
