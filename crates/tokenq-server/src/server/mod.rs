pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod notify;
pub mod reminder;
pub mod service;
pub mod telemetry;
