//! Common library for the attendance workspace
//!
//! This crate provides shared infrastructure used by the attendance service:
//! PostgreSQL connectivity for the document store, a Redis client for the
//! token store, and the error types those layers report.

pub mod cache;
pub mod database;
pub mod error;
