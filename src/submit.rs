//! Signed-submission waiter with nonce lifecycle tracking.
//!
//! ## Nonce Lifecycle
//!
//! ```text
//! NodeClient::submit() → TrackedExtrinsic (nonce: PENDING)
//!                              │
//!         ┌────────────────────┼──────────────────────┐
//!         │                    │                      │
//!   included at durability  Invalid / Dropped    Drop without wait()
//!         │                    │                      │
//!         ▼                    ▼                      ▼
//!   nonce: CONFIRMED     nonce: ABANDONED        nonce: ABANDONED
//! ```
//!
//! A failed dispatch is still an inclusion: `wait()` returns `Ok` with an
//! `ExtrinsicFailed` marker in the report. Nothing is resubmitted.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{stream::BoxStream, Stream, StreamExt};
use serde::Deserialize;
use subxt::utils::{AccountId32, H256};
use tracing::{debug, trace, warn};

use crate::{
    account::TestAccount,
    calls::Call,
    error::{Error, Result, WaitLimit},
    events::EventRecord,
    nonce::{AtomicNonceState, NonceReservation, NonceSequencer},
    report::{ErrorResolver, ExtrinsicReport},
};

// ============================================================================
// Durability
// ============================================================================

/// How far an extrinsic must get before the waiter resolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Included in a best block; may still be retracted
    #[serde(alias = "in_block", alias = "best")]
    InBlock,
    #[default]
    Finalized,
}

// ============================================================================
// SubmissionStatus
// ============================================================================

/// Watch status of a submitted extrinsic.
#[derive(Debug)]
pub enum SubmissionStatus<B> {
    Validated,
    Broadcast,
    InBestBlock(B),
    /// The best block holding the extrinsic was retracted
    Retracted,
    Finalized(B),
    Invalid(String),
    Dropped(String),
    Error(String),
}

pub type StatusStream<B> = BoxStream<'static, Result<SubmissionStatus<B>>>;

/// The block an extrinsic landed in.
#[async_trait]
pub trait InclusionHandle: Send + Sync + 'static {
    fn block_hash(&self) -> H256;

    fn extrinsic_hash(&self) -> H256;

    /// Events emitted by this extrinsic, in execution order.
    async fn events(&self) -> Result<Vec<EventRecord>>;
}

/// Drive `statuses` until the extrinsic reaches `durability`.
///
/// Rejections resolve to [`Error::Rejected`], a stream that ends first to
/// [`Error::SubscriptionClosed`].
pub async fn await_inclusion<B, S>(mut statuses: S, durability: Durability) -> Result<B>
where
    S: Stream<Item = Result<SubmissionStatus<B>>> + Unpin,
{
    while let Some(status) = statuses.next().await {
        match status? {
            SubmissionStatus::Validated => trace!("extrinsic validated"),
            SubmissionStatus::Broadcast => trace!("extrinsic broadcast"),
            SubmissionStatus::Retracted => debug!("best block with extrinsic retracted"),
            SubmissionStatus::InBestBlock(block) => match durability {
                Durability::InBlock => return Ok(block),
                Durability::Finalized => trace!("extrinsic in best block, awaiting finality"),
            },
            SubmissionStatus::Finalized(block) => return Ok(block),
            SubmissionStatus::Invalid(message)
            | SubmissionStatus::Dropped(message)
            | SubmissionStatus::Error(message) => return Err(Error::rejected(message)),
        }
    }
    Err(Error::SubscriptionClosed)
}

// ============================================================================
// PendingExtrinsic
// ============================================================================

/// A call paired with its signer and nonce, consumed by one submission.
///
/// The nonce slot stays RESERVED until the extrinsic is submitted.
#[derive(Debug)]
pub struct PendingExtrinsic {
    pub call: Call,
    pub signer: TestAccount,
    pub nonce: u64,
    pub state: Arc<AtomicNonceState>,
}

impl PendingExtrinsic {
    pub fn new(call: Call, signer: TestAccount, reservation: NonceReservation) -> Self {
        Self {
            call,
            signer,
            nonce: reservation.nonce,
            state: reservation.state,
        }
    }

    pub fn into_reservation(self) -> (Call, TestAccount, NonceReservation) {
        let reservation = NonceReservation {
            nonce: self.nonce,
            state: self.state,
        };
        (self.call, self.signer, reservation)
    }
}

// ============================================================================
// TrackedExtrinsic
// ============================================================================

/// A submitted extrinsic and the nonce it consumed.
///
/// ```ignore
/// let tracked = client.submit(&xyk::create_pool(a, 10, b, 20), &user).await?;
/// let report = tracked.wait().await?;  // nonce confirmed here
///
/// let tracked = client.submit(&call, &user).await?;
/// drop(tracked);  // nonce marked as ABANDONED
/// ```
pub struct TrackedExtrinsic<B: InclusionHandle> {
    statuses: Option<StatusStream<B>>,
    account: AccountId32,
    nonce: u64,
    extrinsic_hash: H256,
    atomic_state: Arc<AtomicNonceState>,
    /// Present when the nonce came from an in-process sequencer
    sequencer: Option<NonceSequencer>,
    resolver: Arc<dyn ErrorResolver>,
    durability: Durability,
    timeout: Option<Duration>,
    log_events: bool,
}

impl<B: InclusionHandle> TrackedExtrinsic<B> {
    pub(crate) fn new(
        statuses: StatusStream<B>,
        account: AccountId32,
        nonce: u64,
        extrinsic_hash: H256,
        atomic_state: Arc<AtomicNonceState>,
        resolver: Arc<dyn ErrorResolver>,
    ) -> Self {
        Self {
            statuses: Some(statuses),
            account,
            nonce,
            extrinsic_hash,
            atomic_state,
            sequencer: None,
            resolver,
            durability: Durability::default(),
            timeout: None,
            log_events: false,
        }
    }

    pub(crate) fn with_sequencer(mut self, sequencer: Option<NonceSequencer>) -> Self {
        self.sequencer = sequencer;
        self
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Fail with a time-limit error if the extrinsic is not included within `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn with_event_logging(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    pub fn account(&self) -> &AccountId32 {
        &self.account
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn extrinsic_hash(&self) -> H256 {
        self.extrinsic_hash
    }

    pub fn atomic_state(&self) -> &Arc<AtomicNonceState> {
        &self.atomic_state
    }

    pub fn is_confirmed(&self) -> bool {
        self.atomic_state.is_confirmed()
    }

    /// Wait for inclusion and collect the extrinsic's events.
    pub async fn wait(mut self) -> Result<ExtrinsicReport> {
        let Some(statuses) = self.statuses.take() else {
            return Err(Error::SubscriptionClosed);
        };

        let inclusion = await_inclusion(statuses, self.durability);
        let included = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, inclusion).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        account = %self.account,
                        nonce = self.nonce,
                        extrinsic_hash = ?self.extrinsic_hash,
                        ?limit,
                        "inclusion timed out, nonce will be marked abandoned on drop"
                    );
                    return Err(Error::ConditionNotMet {
                        condition: format!("inclusion of {:?}", self.extrinsic_hash),
                        limit: WaitLimit::Time(limit),
                        blocks_observed: 0,
                    });
                }
            },
            None => inclusion.await,
        };

        let block = match included {
            Ok(block) => block,
            Err(e) => {
                if self.atomic_state.mark_abandoned() {
                    warn!(
                        account = %self.account,
                        nonce = self.nonce,
                        extrinsic_hash = ?self.extrinsic_hash,
                        error = %e,
                        "extrinsic not included, nonce abandoned"
                    );
                }
                return Err(e);
            }
        };

        // Borrow fields only: the status stream makes `Self` !Sync.
        self.atomic_state.mark_confirmed();
        if let Some(sequencer) = &self.sequencer {
            sequencer.confirm(&self.account, self.nonce).await;
        }
        debug!(
            account = %self.account,
            nonce = self.nonce,
            extrinsic_hash = ?self.extrinsic_hash,
            "nonce confirmed after inclusion"
        );

        let events = block.events().await?;
        let report = ExtrinsicReport::new(
            block.block_hash(),
            block.extrinsic_hash(),
            events,
            self.resolver.as_ref(),
        );

        if self.log_events {
            for event in &report.events {
                debug!(block_hash = ?report.block_hash, "{event}");
            }
        }

        Ok(report)
    }
}

impl<B: InclusionHandle> Drop for TrackedExtrinsic<B> {
    fn drop(&mut self) {
        if self.atomic_state.mark_abandoned() {
            debug!(
                account = %self.account,
                nonce = self.nonce,
                "nonce marked as ABANDONED on TrackedExtrinsic drop"
            );
        }
    }
}
