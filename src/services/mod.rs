//! Supporting services around the payout flow
//!
//! Bank resolution, contact identity pools, and the admin-console CSV pull.

pub mod bank_directory;
pub mod contact_pool;
pub mod console_download;
