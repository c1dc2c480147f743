pub mod auth;
pub mod config;
pub mod cost;
pub mod error;
pub mod formatter;
pub mod idle;
pub mod lifecycle;
pub mod models;
pub mod monitor;
pub mod process;
pub mod providers;
