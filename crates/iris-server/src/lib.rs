//! HTTP dashboard: poller status, latest records, and a manual trigger.

pub mod auth;
pub mod display;
pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;
