pub mod apis;
pub mod browser;
pub mod cache;
pub mod config;
pub mod constants;
pub mod delivery;
pub mod error;
pub mod html;
pub mod observability;
pub mod pipeline;
pub mod server;
pub mod types;
