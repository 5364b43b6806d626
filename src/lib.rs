//! # mangata-e2e
//!
//! Building blocks for end-to-end tests against a Mangata node.
//!
//! ## Core Features
//!
//! - **Nonce Sequencing**: One chain query per signer, then in-process allocation with slot states (Reserved → Pending → Confirmed/Abandoned)
//! - **Sequence Service**: Shared nonce and counter allocation for test workers in separate processes
//! - **Extrinsic Builders**: Typed constructors for the pallets the tests touch (xyk, tokens, sudo, bootstrap, staking, ...)
//! - **Tracked Submission**: Sign, submit and wait for best-block or finalized inclusion with classified pool rejections
//! - **Event Waiting**: Block-bounded and time-bounded waits for events and chain conditions
//!
//! ## Usage
//!
//! ```ignore
//! use mangata_e2e::ext::*;
//!
//! let harness = HarnessConfig::from_env()?;
//! let client = NodeClient::from_harness(&harness).await?;
//! let report = client
//!     .sign_and_wait_success(&xyk::create_pool(TokenId(0), 1_000, TokenId(4), 2_000), &user)
//!     .await?;
//! ```

// ============================================================================
// Internal Module Declarations
// ============================================================================

/// Test accounts: dev keys, random keys and JSON key export
mod account;

/// Node connection, signed submission and chain queries
mod client;

/// Harness and client configuration from `e2e.toml` and the environment
mod config;

/// Error types and pool rejection classification
mod error;

/// Event records, keys and filters
mod events;

/// Test-run tracing subscriber
mod logging;

/// Per-signer nonce sequencer with atomic slot states
mod nonce;

/// Block feeds and bounded event waits
mod poller;

/// Extrinsic outcome reports and dispatch error decoding
mod report;

/// TCP sequence service for nonces and counters shared across processes
mod sequence_service;

/// Tracked extrinsics: status streams, durability and slot bookkeeping
mod submit;

/// Extrinsic builders, one module per pallet
pub mod calls;

/// Test harness module (compiled only in test mode)
#[cfg(test)]
pub mod test_harness;

// ============================================================================
// Public Exports
// ============================================================================

/// Re-export of the chain client the crate is built on.
pub use subxt;

/// Extension module containing the harness API:
///
/// - `NodeClient` - Connected node with tracked submission and waits
/// - `NonceSequencer` - Per-signer nonce allocation
/// - `SequenceServer` / `SequenceClient` - Cross-process nonce allocation
/// - `TrackedExtrinsic` - Submitted extrinsic awaiting inclusion
/// - `EventPoller` - Bounded event and condition waits
/// - `ExtrinsicReport` - Events and outcome of an included extrinsic
pub mod ext {
    pub use super::account::*;
    pub use super::calls::*;
    pub use super::client::*;
    pub use super::config::*;
    pub use super::error::*;
    pub use super::events::*;
    pub use super::logging::*;
    pub use super::nonce::*;
    pub use super::poller::*;
    pub use super::report::*;
    pub use super::sequence_service::*;
    pub use super::submit::*;
}
