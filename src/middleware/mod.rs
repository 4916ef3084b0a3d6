//! Middleware modules for the payout desk API
//!
//! Provides request-id generation and request/response logging middleware

pub mod logging;
