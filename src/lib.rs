//! Unattended deployment of renewed HTTPS certificates to cloud CDN domains
//! and load balancer listeners, with webhook notifications.

pub mod auth;
pub mod certificate;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod notify;
pub mod providers;
pub mod renewal;
