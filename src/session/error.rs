//! Error types for the session module.
//!
//! Every protocol failure is a distinct variant so the CLI shell can map
//! outcomes to exit codes without string matching. Errors propagate to the
//! caller unchanged; the session performs no silent recovery and no retry.

use thiserror::Error;

/// Errors that can occur while bootstrapping or using a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The service-key pattern is absent from the login controller script
    /// (or the script itself could not be fetched). Signals that the
    /// upstream page structure changed; fatal to the session.
    #[error("unable to find the service key in the login controller script")]
    TokenNotFound,

    /// The identity provider rejected the sign-in request.
    #[error("sign-in rejected with HTTP {status}")]
    Authentication {
        /// HTTP status returned by the sign-in endpoint.
        status: u16,
    },

    /// Profile or group data could not be parsed into the expected shape
    /// while inferring account linkage. Fatal to `login()`.
    #[error("account linkage inference failed: {reason}")]
    LinkageInference {
        /// What was missing or malformed.
        reason: String,
    },

    /// The backend rejected the tester-creation request for a reason other
    /// than a duplicate email.
    #[error("tester creation rejected with HTTP {status}: {body}")]
    TesterCreation {
        /// HTTP status returned by the creation endpoint.
        status: u16,
        /// Response body, kept verbatim for diagnosis.
        body: String,
    },

    /// The invitee is already a tester for this app. Benign from the
    /// caller's perspective; distinguishable so it can be treated as a
    /// no-op rather than a failure.
    #[error("{email} is already a tester for this app")]
    DuplicateTester {
        /// The email that was already invited.
        email: String,
    },

    /// The backend rejected the group-membership assignment.
    #[error("group assignment rejected with HTTP {status}: {body}")]
    GroupAssignment {
        /// HTTP status returned by the assignment endpoint.
        status: u16,
        /// Response body, kept verbatim for diagnosis.
        body: String,
    },

    /// No default external group exists for this app and none was supplied,
    /// so there is no group path to assign the new tester to.
    #[error("no default external tester group exists for this app; supply a group id explicitly")]
    GroupUnresolved,

    /// The external-testers list could not be fetched or parsed.
    #[error("external tester list rejected with HTTP {status}: {body}")]
    TesterList {
        /// HTTP status returned by the tester-list endpoint.
        status: u16,
        /// Response body, kept verbatim for diagnosis.
        body: String,
    },

    /// Connection-level failure (DNS, TLS, refused connection, proxy).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SessionError {
    /// Creates a linkage-inference error from a reason string.
    pub(crate) fn linkage(reason: impl Into<String>) -> Self {
        Self::LinkageInference {
            reason: reason.into(),
        }
    }
}
