//! Issued token handles and their secrets.

pub mod handle;
pub mod secret;
