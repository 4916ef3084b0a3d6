//! Payout desk: withdrawal ingestion, batch payout dispatch, and status
//! reconciliation against the upstream payment gateways.
//!
//! The crate is organized around a small number of seams:
//! - [`database::WithdrawalStore`] owns every durable state change
//! - [`gateways::GatewayRouter`] dispatches to the configured gateways
//! - [`workers`] drives batches and polls as paced background runs
//! - [`api`] exposes the operator-facing HTTP surface

pub mod api;
pub mod config;
pub mod database;
pub mod gateways;
pub mod ingest;
pub mod logging;
pub mod middleware;
pub mod model;
pub mod services;
pub mod workers;
