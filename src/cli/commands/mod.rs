pub mod admin;
pub mod serve;
pub mod tenant;
