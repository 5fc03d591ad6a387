//! Route handlers for the REST API.

pub mod health;
pub mod modes;
pub mod sessions;
pub mod tasks;
