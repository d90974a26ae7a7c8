//! HTTP surface of the contest portal's notification subsystem.
//!
//! - GET    /health
//! - GET    /api/contestant/notifications?after=<id>
//! - GET    /api/contestant/push_subscriptions/vapid_key
//! - POST   /api/contestant/push_subscriptions
//! - DELETE /api/contestant/push_subscriptions
//! - POST   /internal/clarifications/{id}/answered
//! - POST   /internal/benchmark_jobs/{id}/finished

pub mod middleware;
pub mod routes;
pub mod state;
