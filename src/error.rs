//! Error types and rejection classification.
//!
//! Every failure the harness can surface is a variant of [`Error`]. Failures
//! the node reports before an extrinsic is included are classified into a
//! [`RejectionKind`] by matching the pool's message text, so tests can assert
//! on the reason without string matching of their own.

use std::{fmt, time::Duration};

use crate::report::DispatchFailure;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// ============================================================================
// Error
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The node could not be reached or refused the query (setup error).
    #[error("node unavailable: {0}")]
    NodeUnavailable(String),

    /// A required environment variable is not set (setup error).
    #[error("required environment variable {0} is not set")]
    MissingEnvVar(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The node rejected the extrinsic before inclusion.
    #[error("extrinsic rejected ({kind:?}): {message}")]
    Rejected { kind: RejectionKind, message: String },

    /// The status subscription ended before the extrinsic reached the requested durability.
    #[error("transaction status subscription closed before inclusion")]
    SubscriptionClosed,

    /// The extrinsic was included but its dispatch failed.
    #[error("extrinsic dispatch failed: {0}")]
    DispatchFailed(DispatchFailure),

    /// An awaited event or state condition was not observed within its budget.
    #[error("{condition} not found within {limit}")]
    ConditionNotMet {
        condition: String,
        limit: WaitLimit,
        blocks_observed: u32,
    },

    #[error("sequence service: {0}")]
    SequenceService(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error(transparent)]
    Subxt(#[from] subxt::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Rejection kind, if this is a pre-inclusion rejection.
    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            Error::Rejected { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_condition_not_met(&self) -> bool {
        matches!(self, Error::ConditionNotMet { .. })
    }

    /// Setup errors abort the run; everything else fails a single test.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Error::NodeUnavailable(_) | Error::MissingEnvVar(_) | Error::Config(_)
        )
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        Error::Rejected {
            kind: classify_rejection(&message),
            message,
        }
    }
}

// ============================================================================
// WaitLimit
// ============================================================================

/// The bound that ended an unsuccessful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitLimit {
    Blocks(u32),
    Time(Duration),
}

impl fmt::Display for WaitLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitLimit::Blocks(_) => f.write_str("blocks limit"),
            WaitLimit::Time(d) => write!(f, "time limit ({d:?})"),
        }
    }
}

// ============================================================================
// Rejection Classification
// ============================================================================

/// Classified pool and RPC rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Nonce already used on chain
    Stale,
    /// Nonce ahead of the chain, the extrinsic would wait in the future queue
    Future,
    /// Signer cannot pay the fees
    InsufficientFunds,
    /// A transaction with the same nonce and higher priority is already pooled
    PriorityTooLow,
    /// The exact extrinsic is already in the pool
    AlreadyImported,
    /// Signature does not verify
    BadProof,
    /// Block weight or length limits exceeded
    ExhaustsResources,
    /// Connection or transport problem
    Network,
    Unknown,
}

impl RejectionKind {
    /// A nonce-related rejection means the sequencer and the chain disagree.
    pub fn is_nonce_related(&self) -> bool {
        matches!(
            self,
            RejectionKind::Stale | RejectionKind::Future | RejectionKind::PriorityTooLow
        )
    }
}

/// Classify a rejection message reported by the node.
///
/// Substrate nodes phrase the same condition differently across the author
/// RPC, the pool and the chain-head API, so several patterns map to each kind.
pub fn classify_rejection(message: &str) -> RejectionKind {
    let msg = message.to_lowercase();

    if msg.contains("outdated") || msg.contains("stale") {
        return RejectionKind::Stale;
    }

    if msg.contains("valid in the future") || msg.contains("future") {
        return RejectionKind::Future;
    }

    if msg.contains("inability to pay some fees")
        || msg.contains("balance too low")
        || msg.contains("insufficient")
    {
        return RejectionKind::InsufficientFunds;
    }

    if msg.contains("priority is too low") || msg.contains("too low priority") {
        return RejectionKind::PriorityTooLow;
    }

    if msg.contains("already imported") || msg.contains("already in the pool") {
        return RejectionKind::AlreadyImported;
    }

    if msg.contains("bad signature") || msg.contains("bad proof") || msg.contains("badproof") {
        return RejectionKind::BadProof;
    }

    if msg.contains("exhausts the resources") || msg.contains("exhaustsresources") {
        return RejectionKind::ExhaustsResources;
    }

    if msg.contains("connection")
        || msg.contains("closed")
        || msg.contains("timeout")
        || msg.contains("transport")
        || msg.contains("broken pipe")
    {
        return RejectionKind::Network;
    }

    RejectionKind::Unknown
}

/// Check if an error message indicates a timeout condition.
///
/// An extrinsic whose wait timed out may still be included later, so its
/// nonce must not be handed out again.
pub fn is_timeout_error(error: &anyhow::Error) -> bool {
    if let Some(Error::ConditionNotMet { .. }) = error.downcast_ref::<Error>() {
        return true;
    }
    let error_str = error.to_string().to_lowercase();
    error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("deadline exceeded")
}
