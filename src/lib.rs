//! TestFlight Invite Core Library
//!
//! This library automates inviting a beta tester to an app's TestFlight
//! program through the cookie-and-session-based App Store Connect web
//! backend, which exposes no stable public API. It reproduces the network
//! behavior of the browser console: scraping the sign-in service key from a
//! served script, signing in against the identity-provider host, carrying
//! the resulting cookies across requests, and driving the two-phase tester
//! invitation.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`auth`] - Cookie jar with `Set-Cookie` normalization for the session
//! - [`session`] - Authenticated session and tester-management operations
//!
//! The CLI shell (`src/main.rs`) is a thin collaborator: it validates
//! arguments, prompts for the password, runs one [`session::Session`] and
//! maps the outcome to an exit code. The core never prints; diagnostics go
//! through `tracing`.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod session;

// Re-export commonly used types
pub use auth::NormalizingJar;
pub use session::{Session, SessionError, SessionOptions, TesterGroup};
