pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod integrity;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod services;
pub mod tenancy;
