//! I/O helpers for pipeline commands.

pub mod batch;
pub mod config;
pub mod layout;
pub mod rotate;
pub mod store;
