//! Core domain types, configuration, and shared helpers.

pub mod config;
pub mod model;
pub mod retry;
pub mod types;
