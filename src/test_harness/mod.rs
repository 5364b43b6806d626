//! In-memory chain for exercising sequencing, submission and waiting
//! without a node.
//!
//! `MockChain` plays the node's part behind every seam of the crate:
//!
//! - **NonceSource**: per-account on-chain nonces, with a switch that makes
//!   the node unreachable
//! - **BlockSource**: an endless chain that produces a block whenever a feed
//!   is polled, taking events from a script and producing empty blocks after
//! - **Submission**: scripted status streams ending in inclusion, rejection,
//!   a stall or an early close
//!
//! # Example
//!
//! ```ignore
//! use crate::test_harness::{MockChain, MockOutcome};
//!
//! #[tokio::test]
//! async fn test_included() {
//!     let chain = MockChain::new();
//!     let sequencer = NonceSequencer::new();
//!     let user = TestAccount::random().unwrap();
//!
//!     let tracked = chain.submit(&sequencer, &user, MockOutcome::success()).await.unwrap();
//!     assert!(tracked.wait().await.unwrap().is_success());
//! }
//! ```

#[cfg(test)]
mod error_scenarios;
mod scenario;

pub use scenario::*;

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use subxt::{
    ext::scale_value::{Composite, Value},
    utils::{AccountId32, H256},
};

use crate::{
    account::TestAccount,
    error::{self, Error},
    events::{EventPhase, EventRecord},
    nonce::{NonceSequencer, NonceSource},
    poller::{BlockEvents, BlockFeed, BlockSource, BlockStream},
    report::ErrorResolver,
    submit::{InclusionHandle, StatusStream, SubmissionStatus, TrackedExtrinsic},
};

// ============================================================================
// MockInclusion
// ============================================================================

/// Block holding a mock extrinsic.
#[derive(Debug, Clone)]
pub struct MockInclusion {
    pub block_hash: H256,
    pub extrinsic_hash: H256,
    pub events: Vec<EventRecord>,
}

#[async_trait]
impl InclusionHandle for MockInclusion {
    fn block_hash(&self) -> H256 {
        self.block_hash
    }

    fn extrinsic_hash(&self) -> H256 {
        self.extrinsic_hash
    }

    async fn events(&self) -> error::Result<Vec<EventRecord>> {
        Ok(self.events.clone())
    }
}

// ============================================================================
// MockOutcome
// ============================================================================

/// How the mock node treats a submitted extrinsic.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Included and finalized with these events
    Included(Vec<EventRecord>),
    /// Pool rejects the extrinsic with this message
    Invalid(String),
    /// Pool drops the extrinsic with this message
    Dropped(String),
    /// Status stream never progresses past broadcast
    Stalled,
    /// Status stream ends after broadcast
    ClosedEarly,
}

impl MockOutcome {
    pub fn success() -> Self {
        MockOutcome::Included(vec![system_event("ExtrinsicSuccess", Vec::new())])
    }

    /// Included with the given events followed by `ExtrinsicSuccess`.
    pub fn success_with(mut events: Vec<EventRecord>) -> Self {
        events.push(system_event("ExtrinsicSuccess", Vec::new()));
        MockOutcome::Included(events)
    }

    /// Included, but the dispatch failed with module error `(pallet, error)`.
    pub fn module_failure(pallet_index: u8, error_index: u8) -> Self {
        MockOutcome::Included(vec![system_event(
            "ExtrinsicFailed",
            vec![("dispatch_error", module_error(pallet_index, error_index))],
        )])
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        MockOutcome::Invalid(message.into())
    }

    fn is_included(&self) -> bool {
        matches!(self, MockOutcome::Included(_))
    }
}

// ============================================================================
// MockChain
// ============================================================================

/// Resolves the module errors the harness scenarios use.
pub struct MockResolver;

impl ErrorResolver for MockResolver {
    fn module_error(&self, pallet_index: u8, error_index: u8) -> Option<(String, String)> {
        match (pallet_index, error_index) {
            (13, 3) => Some(("Xyk".into(), "PoolAlreadyExists".into())),
            (13, 10) => Some(("Xyk".into(), "NotEnoughAssets".into())),
            (8, 2) => Some(("Sudo".into(), "RequireSudo".into())),
            _ => None,
        }
    }
}

#[derive(Default)]
struct ChainState {
    nonces: BTreeMap<AccountId32, u64>,
    script: VecDeque<Vec<EventRecord>>,
}

#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
    height: Arc<AtomicU64>,
    nonce_queries: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    submissions: Arc<AtomicU64>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nonce(self, account: &AccountId32, nonce: u64) -> Self {
        self.set_nonce(account, nonce);
        self
    }

    pub fn set_nonce(&self, account: &AccountId32, nonce: u64) {
        self.lock().nonces.insert(account.clone(), nonce);
    }

    pub fn on_chain_nonce(&self, account: &AccountId32) -> u64 {
        self.lock().nonces.get(account).copied().unwrap_or_default()
    }

    /// Make nonce queries fail as if the node were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// How many times a nonce was read from this chain.
    pub fn nonce_queries(&self) -> usize {
        self.nonce_queries.load(Ordering::SeqCst)
    }

    /// Queue the events of upcoming blocks, one entry per block.
    pub fn script_blocks(&self, blocks: impl IntoIterator<Item = Vec<EventRecord>>) {
        self.lock().script.extend(blocks);
    }

    /// Queue `count` empty blocks followed by one holding `events`.
    pub fn emit_after(&self, count: usize, events: Vec<EventRecord>) {
        let mut state = self.lock();
        state.script.extend(std::iter::repeat_with(Vec::new).take(count));
        state.script.push_back(events);
    }

    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn produce_block(&self) -> BlockEvents {
        let number = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        let events = self.lock().script.pop_front().unwrap_or_default();
        BlockEvents {
            number,
            hash: block_hash(number),
            events,
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Sign-and-submit as `NodeClient::submit` does, with a scripted outcome.
    pub async fn submit(
        &self,
        sequencer: &NonceSequencer,
        signer: &TestAccount,
        outcome: MockOutcome,
    ) -> Result<TrackedExtrinsic<MockInclusion>> {
        let account = signer.account_id();
        let reservation = sequencer.reserve(self, &account).await?;
        let extrinsic_hash = H256::from_low_u64_be(
            0xe000 + self.submissions.fetch_add(1, Ordering::SeqCst),
        );
        sequencer
            .mark_sent(&account, reservation.nonce, extrinsic_hash)
            .await;

        if outcome.is_included() {
            let mut state = self.lock();
            let nonce = state.nonces.entry(account.clone()).or_default();
            *nonce = (*nonce).max(reservation.nonce + 1);
        }

        let statuses = self.statuses(extrinsic_hash, outcome);
        Ok(TrackedExtrinsic::new(
            statuses,
            account,
            reservation.nonce,
            extrinsic_hash,
            reservation.state,
            Arc::new(MockResolver),
        )
        .with_sequencer(Some(sequencer.clone())))
    }

    fn statuses(&self, extrinsic_hash: H256, outcome: MockOutcome) -> StatusStream<MockInclusion> {
        let opening = vec![SubmissionStatus::Validated, SubmissionStatus::Broadcast];
        let closing = match outcome {
            MockOutcome::Included(events) => {
                let inclusion = MockInclusion {
                    block_hash: block_hash(self.height() + 1),
                    extrinsic_hash,
                    events,
                };
                vec![
                    SubmissionStatus::InBestBlock(inclusion.clone()),
                    SubmissionStatus::Finalized(inclusion),
                ]
            }
            MockOutcome::Invalid(message) => vec![SubmissionStatus::Invalid(message)],
            MockOutcome::Dropped(message) => vec![SubmissionStatus::Dropped(message)],
            MockOutcome::ClosedEarly => Vec::new(),
            MockOutcome::Stalled => {
                return stream::iter(opening.into_iter().map(Ok::<_, Error>))
                    .chain(stream::pending())
                    .boxed();
            }
        };
        stream::iter(opening.into_iter().chain(closing).map(Ok::<_, Error>)).boxed()
    }
}

#[async_trait]
impl NonceSource for MockChain {
    async fn account_nonce(&self, account: &AccountId32) -> error::Result<u64> {
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::NodeUnavailable("connection refused".into()));
        }
        // Let concurrent first requests interleave.
        tokio::task::yield_now().await;
        Ok(self.on_chain_nonce(account))
    }
}

#[async_trait]
impl BlockSource for MockChain {
    async fn blocks(&self, _feed: BlockFeed) -> error::Result<BlockStream> {
        let chain = self.clone();
        Ok(stream::repeat_with(move || Ok(chain.produce_block())).boxed())
    }
}

// ============================================================================
// Event constructors
// ============================================================================

pub fn block_hash(number: u64) -> H256 {
    H256::from_low_u64_be(number)
}

pub fn event(pallet: &str, variant: &str, fields: Vec<Value>) -> EventRecord {
    EventRecord::new(pallet, variant, EventPhase::ApplyExtrinsic(1), Composite::Unnamed(fields))
}

pub fn system_event(variant: &str, fields: Vec<(&str, Value)>) -> EventRecord {
    EventRecord::new(
        "System",
        variant,
        EventPhase::ApplyExtrinsic(1),
        Composite::Named(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
    )
}

/// `Xyk.PoolCreated(creator, first, first_amount, second, second_amount)`.
pub fn pool_created(
    creator: &AccountId32,
    first: u32,
    first_amount: u128,
    second: u32,
    second_amount: u128,
) -> EventRecord {
    event(
        "Xyk",
        "PoolCreated",
        vec![
            Value::from_bytes(creator.0),
            Value::u128(first as u128),
            Value::u128(first_amount),
            Value::u128(second as u128),
            Value::u128(second_amount),
        ],
    )
}

pub fn module_error(pallet_index: u8, error_index: u8) -> Value {
    Value::unnamed_variant(
        "Module",
        [Value::named_composite([
            ("index", Value::u128(pallet_index as u128)),
            ("error", Value::from_bytes([error_index, 0, 0, 0])),
        ])],
    )
}

// ============================================================================
// Tests
// ============================================================================
