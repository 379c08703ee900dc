//! Collaborator traits.
//!
//! The registry and crawler only talk to the network, the HTML, and the
//! dataset through these interfaces.

pub mod extractor;
pub mod fetcher;
pub mod sink;
