//! Per-account nonce sequencing with atomic slot states.
//!
//! Concurrently running tests share a handful of signers, the sudo account
//! above all. Two extrinsics from one signer must never carry the same nonce,
//! so every nonce is handed out by a [`NonceSequencer`]: the on-chain nonce is
//! read once per account, after which the sequencer only increments in memory.
//!
//! ## Architecture
//!
//! - **Scoped service**: a sequencer is an ordinary value that is cloned into
//!   whatever needs it. Clones share state; separate instances do not.
//! - **Per-account lock**: each account has its own `tokio::sync::Mutex`, so
//!   allocations for different accounts never contend.
//! - **Lock-free slot updates**: `AtomicU8` slot states can be moved from a
//!   `Drop` implementation without taking the lock.
//!
//! ## State Machine
//!
//! ```text
//!   RESERVED ──► PENDING ──► CONFIRMED
//!                   │
//!                   └──► ABANDONED (rejected or dropped unawaited)
//! ```
//!
//! Nonces are never handed back. An abandoned nonce leaves a gap on chain that
//! the caller clears with [`NonceSequencer::reset`].

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Instant,
};

use async_trait::async_trait;
use dashmap::DashMap;
use subxt::utils::{AccountId32, H256};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{Error, Result};

// ============================================================================
// NonceSource
// ============================================================================

/// Where a sequencer reads an account's on-chain nonce from.
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// Next nonce the chain expects from `account`.
    async fn account_nonce(&self, account: &AccountId32) -> Result<u64>;
}

#[async_trait]
impl<T: NonceSource + ?Sized> NonceSource for Arc<T> {
    async fn account_nonce(&self, account: &AccountId32) -> Result<u64> {
        (**self).account_nonce(account).await
    }
}

// ============================================================================
// Atomic Nonce State
// ============================================================================

pub mod nonce_state {
    /// Nonce is reserved but the extrinsic has not been submitted
    pub const RESERVED: u8 = 0;
    /// Extrinsic submitted, waiting for inclusion
    pub const PENDING: u8 = 1;
    /// Extrinsic rejected or dropped without reaching the chain
    pub const ABANDONED: u8 = 2;
    /// Extrinsic included in a block
    pub const CONFIRMED: u8 = 3;

    pub fn name(state: u8) -> &'static str {
        match state {
            RESERVED => "RESERVED",
            PENDING => "PENDING",
            ABANDONED => "ABANDONED",
            CONFIRMED => "CONFIRMED",
            _ => "UNKNOWN",
        }
    }
}

/// Shared atomic state for a nonce slot.
#[derive(Debug)]
pub struct AtomicNonceState {
    state: AtomicU8,
}

impl AtomicNonceState {
    pub fn new_reserved() -> Self {
        Self {
            state: AtomicU8::new(nonce_state::RESERVED),
        }
    }

    pub fn get(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    /// RESERVED → PENDING. Returns `true` if the transition happened.
    pub fn mark_pending(&self) -> bool {
        self.state
            .compare_exchange(
                nonce_state::RESERVED,
                nonce_state::PENDING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// RESERVED or PENDING → ABANDONED. Safe to call from `Drop`.
    ///
    /// Returns `true` if the transition happened.
    pub fn mark_abandoned(&self) -> bool {
        let mut current = self.get();
        loop {
            if current != nonce_state::RESERVED && current != nonce_state::PENDING {
                return false;
            }
            match self.state.compare_exchange(
                current,
                nonce_state::ABANDONED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Confirmation is terminal and overrides any other state.
    pub fn mark_confirmed(&self) {
        self.state.store(nonce_state::CONFIRMED, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.get() == nonce_state::PENDING
    }

    pub fn is_abandoned(&self) -> bool {
        self.get() == nonce_state::ABANDONED
    }

    pub fn is_confirmed(&self) -> bool {
        self.get() == nonce_state::CONFIRMED
    }
}

// ============================================================================
// Nonce Slot
// ============================================================================

/// A nonce handed out by the sequencer and not yet confirmed.
#[derive(Debug, Clone)]
pub struct NonceSlot {
    pub atomic_state: Arc<AtomicNonceState>,
    /// Set when the extrinsic is submitted
    pub extrinsic_hash: Option<H256>,
    pub reserved_at: Instant,
    pub sent_at: Option<Instant>,
}

impl NonceSlot {
    pub fn new_reserved() -> (Self, Arc<AtomicNonceState>) {
        let atomic_state = Arc::new(AtomicNonceState::new_reserved());
        let slot = Self {
            atomic_state: Arc::clone(&atomic_state),
            extrinsic_hash: None,
            reserved_at: Instant::now(),
            sent_at: None,
        };
        (slot, atomic_state)
    }

    pub fn state(&self) -> u8 {
        self.atomic_state.get()
    }
}

/// A freshly reserved nonce and the handle to its slot state.
#[derive(Debug, Clone)]
pub struct NonceReservation {
    pub nonce: u64,
    pub state: Arc<AtomicNonceState>,
}

// ============================================================================
// Account Nonce State (internal)
// ============================================================================

#[derive(Debug)]
struct AccountNonceState {
    /// Nonce read from chain when the record was created
    initial_nonce: u64,
    /// Next nonce to hand out
    next_nonce: u64,
    slots: BTreeMap<u64, NonceSlot>,
}

impl AccountNonceState {
    fn new(on_chain_nonce: u64) -> Self {
        Self {
            initial_nonce: on_chain_nonce,
            next_nonce: on_chain_nonce,
            slots: BTreeMap::new(),
        }
    }
}

/// Snapshot of one account's sequencing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceStatus {
    pub initial_nonce: u64,
    pub next_nonce: u64,
    /// Nonces in RESERVED or PENDING state
    pub pending_nonces: Vec<u64>,
    pub abandoned_nonces: Vec<u64>,
}

impl NonceStatus {
    pub fn issued(&self) -> u64 {
        self.next_nonce - self.initial_nonce
    }

    pub fn pending_count(&self) -> usize {
        self.pending_nonces.len()
    }

    pub fn abandoned_count(&self) -> usize {
        self.abandoned_nonces.len()
    }
}

// ============================================================================
// NonceSequencer
// ============================================================================

/// Hands out unique, strictly increasing nonces per account.
///
/// - `next_nonce()`: allocate, untracked
/// - `reserve()`: allocate → `Reserved`
/// - `mark_sent()`: `Reserved` → `Pending`
/// - `confirm()`: `Pending` → cleared, together with every lower slot
/// - `AtomicNonceState::mark_abandoned()`: → `Abandoned`
/// - `reset()`: forget the account so the next allocation re-reads the chain
#[derive(Clone, Debug, Default)]
pub struct NonceSequencer {
    /// Keyed by the raw account bytes; `AccountId32` is not `Hash`.
    states: Arc<DashMap<[u8; 32], Arc<Mutex<AccountNonceState>>>>,
}

impl NonceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next nonce for `account` without tracking a slot for it.
    ///
    /// The first call for an account queries `source`; a failure there
    /// surfaces as [`Error::NodeUnavailable`] and leaves no record behind.
    pub async fn next_nonce<S>(&self, source: &S, account: &AccountId32) -> Result<u64>
    where
        S: NonceSource + ?Sized,
    {
        let state_arc = self.get_or_init_state(source, account).await?;
        let mut state = state_arc.lock().await;

        let nonce = state.next_nonce;
        state.next_nonce += 1;

        trace!(%account, nonce, next = state.next_nonce, "issued nonce");
        Ok(nonce)
    }

    /// Issue the next nonce and track it in a slot until it is confirmed.
    pub async fn reserve<S>(&self, source: &S, account: &AccountId32) -> Result<NonceReservation>
    where
        S: NonceSource + ?Sized,
    {
        let state_arc = self.get_or_init_state(source, account).await?;
        let mut state = state_arc.lock().await;

        let nonce = state.next_nonce;
        let (slot, atomic_state) = NonceSlot::new_reserved();
        state.slots.insert(nonce, slot);
        state.next_nonce += 1;

        trace!(%account, nonce, next = state.next_nonce, "allocated nonce");

        Ok(NonceReservation {
            nonce,
            state: atomic_state,
        })
    }

    /// Next nonce that would be issued, without issuing it.
    pub async fn peek(&self, account: &AccountId32) -> Option<u64> {
        let state_arc = self.states.get(&account.0).map(|s| Arc::clone(s.value()))?;
        let state = state_arc.lock().await;
        Some(state.next_nonce)
    }

    pub async fn mark_sent(&self, account: &AccountId32, nonce: u64, extrinsic_hash: H256) {
        let Some(state_arc) = self.states.get(&account.0).map(|s| Arc::clone(s.value())) else {
            return;
        };
        let mut state = state_arc.lock().await;
        if let Some(slot) = state.slots.get_mut(&nonce) {
            if slot.atomic_state.mark_pending() {
                slot.extrinsic_hash = Some(extrinsic_hash);
                slot.sent_at = Some(Instant::now());
                trace!(%account, nonce, ?extrinsic_hash, "marked nonce as sent");
            }
        }
    }

    /// Record that the extrinsic using `nonce` was included.
    ///
    /// Slots below `nonce` are cleared too: the chain cannot include a nonce
    /// before all lower ones.
    pub async fn confirm(&self, account: &AccountId32, nonce: u64) {
        let Some(state_arc) = self.states.get(&account.0).map(|s| Arc::clone(s.value())) else {
            return;
        };
        let mut state = state_arc.lock().await;
        state.slots.retain(|&n, slot| {
            if n <= nonce {
                slot.atomic_state.mark_confirmed();
                false
            } else {
                true
            }
        });
        trace!(%account, nonce, "confirmed nonce");
    }

    /// Nonces whose extrinsics never reached the chain.
    pub async fn abandoned_nonces(&self, account: &AccountId32) -> Vec<u64> {
        let Some(state_arc) = self.states.get(&account.0).map(|s| Arc::clone(s.value())) else {
            return vec![];
        };
        let state = state_arc.lock().await;
        state
            .slots
            .iter()
            .filter(|(_, slot)| slot.atomic_state.is_abandoned())
            .map(|(&nonce, _)| nonce)
            .collect()
    }

    /// Forget everything known about `account`.
    ///
    /// The next allocation reads the on-chain nonce again. Outstanding slot
    /// handles keep working but are no longer tracked.
    pub fn reset(&self, account: &AccountId32) {
        if self.states.remove(&account.0).is_some() {
            debug!(%account, "nonce record reset");
        }
    }

    pub async fn status(&self, account: &AccountId32) -> Option<NonceStatus> {
        let state_arc = self.states.get(&account.0).map(|s| Arc::clone(s.value()))?;
        let state = state_arc.lock().await;

        let mut pending_nonces = Vec::new();
        let mut abandoned_nonces = Vec::new();
        for (&nonce, slot) in &state.slots {
            match slot.state() {
                nonce_state::RESERVED | nonce_state::PENDING => pending_nonces.push(nonce),
                nonce_state::ABANDONED => abandoned_nonces.push(nonce),
                _ => {}
            }
        }

        Some(NonceStatus {
            initial_nonce: state.initial_nonce,
            next_nonce: state.next_nonce,
            pending_nonces,
            abandoned_nonces,
        })
    }

    async fn get_or_init_state<S>(
        &self,
        source: &S,
        account: &AccountId32,
    ) -> Result<Arc<Mutex<AccountNonceState>>>
    where
        S: NonceSource + ?Sized,
    {
        // Fast path: already exists
        if let Some(state) = self.states.get(&account.0) {
            return Ok(Arc::clone(state.value()));
        }

        // Slow path: read from chain. Several callers may race here; the
        // first insert wins and the others discard their reading.
        let on_chain_nonce = source
            .account_nonce(account)
            .await
            .map_err(|e| match e {
                Error::NodeUnavailable(msg) => Error::NodeUnavailable(msg),
                other => Error::NodeUnavailable(other.to_string()),
            })?;

        let entry = self
            .states
            .entry(account.0)
            .or_insert_with(|| {
                trace!(%account, on_chain_nonce, "initialized nonce from chain");
                Arc::new(Mutex::new(AccountNonceState::new(on_chain_nonce)))
            });

        Ok(Arc::clone(entry.value()))
    }
}
