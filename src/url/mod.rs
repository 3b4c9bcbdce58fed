//! URL handling module for Sumi-Mirror
//!
//! This module provides reference resolution, hostname helpers for the
//! same-origin filter, and the private-address guard applied to seed URLs.

mod domain;
mod guard;
mod resolve;

// Re-export main functions
pub use domain::{extract_domain, same_host};
pub use guard::{is_private_host, validate_seed};
pub use resolve::resolve_reference;
