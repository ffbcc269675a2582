//! Sensor Dash - single-page dashboard for black carbon sensor readings
//!
//! This library exposes the core modules for testing and reuse.

pub mod callbacks;
pub mod chart;
pub mod common;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod layout;
pub mod queries;
pub mod routes;
