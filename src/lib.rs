//! Client core for a calorie and activity tracking service.
//!
//! [`client::TrackerClient`] talks to the REST backend, [`store::StateStore`]
//! keeps the session's snapshot of foods, exercise types, logs and profile,
//! and [`dashboard`] turns a snapshot into per-period energy balance figures.

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod models;
pub mod store;

pub use client::{DataApi, TrackerClient};
pub use dashboard::{build_dashboard, DashboardResult, Locale, Period};
pub use error::{ApiError, ValidationError};
pub use store::StateStore;
