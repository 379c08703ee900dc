//! Domain types: pages, tropes, works, and configuration.

pub mod config;
pub mod page;
pub mod trope;
pub mod work;
