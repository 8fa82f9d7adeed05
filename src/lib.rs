// Library crate exposing the application modules so integration tests and the binary can share code.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod repository;
