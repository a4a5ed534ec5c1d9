//! Bidding marketplace backend
//!
//! Clients post projects, verified companies bid on them, and administrators
//! gate which companies may bid. The [`lifecycle`] module holds the coupled
//! state machines; everything else is the HTTP service around them.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod store;
