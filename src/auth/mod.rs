//! Authentication and cookie management.
//!
//! This module provides the session cookie jar, which behaves like a
//! standard RFC-compliant jar apart from one ingestion-time normalization
//! of the `Version` cookie attribute.

mod cookies;

pub use cookies::NormalizingJar;
