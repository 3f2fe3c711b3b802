//! Legal status transitions and derived statuses per entity kind

pub mod consent;
pub mod handle;
pub mod template;
