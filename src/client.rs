//! Node client with nonce-sequenced submission and chain queries.
//!
//! `NodeClient` wraps a subxt `OnlineClient` and wires every seam of the
//! crate to a live node:
//!
//! ```text
//! NodeClient
//! ├── NonceSource        System account nonce via `account_nextIndex`
//! ├── BlockSource        finalized / best block subscriptions with events
//! ├── NonceAllocator     in-process sequencer or shared sequence service
//! └── submit()           sign with the allocated nonce → TrackedExtrinsic
//! ```
//!
//! ## Usage Flow
//!
//! 1. Load the environment: `HarnessConfig::from_env()`
//! 2. Connect: `NodeClient::from_harness(&config).await`
//! 3. Submit: `client.sign_and_wait(&call, &user).await` (nonce confirmed on inclusion)
//! 4. Wait: `client.wait_for_event("xyk.PoolCreated", None).await`

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use subxt::{
    config::DefaultExtrinsicParamsBuilder,
    ext::scale_value::{Composite, Value, ValueDef},
    tx::{TxInBlock, TxStatus},
    utils::{AccountId32, H256},
    OnlineClient, PolkadotConfig,
};
use tracing::{debug, info, warn};

use crate::{
    account::TestAccount,
    calls::{self, sudo, Balance, Call, TokenId},
    config::{ClientConfig, HarnessConfig},
    error::{Error, Result},
    events::{value_at, EventFilter, EventRecord},
    nonce::{AtomicNonceState, NonceReservation, NonceSource},
    poller::{BlockEvents, BlockFeed, BlockSource, BlockStream, EventMatch, EventPoller, WaitBudget},
    report::{ErrorResolver, ExtrinsicReport},
    sequence_service::{NonceAllocator, SequenceClient, SequenceServer},
    submit::{InclusionHandle, PendingExtrinsic, StatusStream, SubmissionStatus, TrackedExtrinsic},
};

/// Chain configuration: sr25519 accounts, `u32` block numbers, H256 hashes.
pub type ChainConfig = PolkadotConfig;

pub type ChainApi = OnlineClient<ChainConfig>;

/// Block holding a submitted extrinsic.
pub type Inclusion = TxInBlock<ChainConfig, ChainApi>;

/// Counter the sequence service seeds from the staking candidate pool.
pub const CANDIDATE_COUNTER: &str = "candidate";

// ============================================================================
// TokenBalance
// ============================================================================

/// `Tokens.Accounts` entry of one account and token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenBalance {
    pub free: Balance,
    pub reserved: Balance,
    pub frozen: Balance,
}

// ============================================================================
// NodeClient
// ============================================================================

#[derive(Clone)]
pub struct NodeClient {
    api: ChainApi,
    allocator: NonceAllocator,
    config: ClientConfig,
    sudo: Option<TestAccount>,
    resolver: Arc<dyn ErrorResolver>,
}

impl NodeClient {
    /// Connect to `url` with an in-process nonce sequencer.
    ///
    /// An unreachable node surfaces as [`Error::NodeUnavailable`].
    pub async fn connect(url: &str, config: ClientConfig) -> Result<Self> {
        let api = ChainApi::from_insecure_url(url)
            .await
            .map_err(|e| Error::NodeUnavailable(format!("{url}: {e}")))?;
        info!(url, genesis = ?api.genesis_hash(), "connected to node");

        let resolver: Arc<dyn ErrorResolver> = Arc::new(api.metadata());
        Ok(Self {
            api,
            allocator: NonceAllocator::default(),
            config,
            sudo: None,
            resolver,
        })
    }

    /// Connect as described by the harness environment.
    pub async fn from_harness(harness: &HarnessConfig) -> Result<Self> {
        let client = Self::connect(&harness.api_url, harness.client.clone())
            .await?
            .with_sudo(harness.sudo()?);
        Ok(match &harness.nonce_service {
            Some(addr) => client.with_allocator(NonceAllocator::Remote(SequenceClient::new(addr))),
            None => client,
        })
    }

    pub fn with_sudo(mut self, sudo: TestAccount) -> Self {
        self.sudo = Some(sudo);
        self
    }

    pub fn with_allocator(mut self, allocator: NonceAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api(&self) -> &ChainApi {
        &self.api
    }

    pub fn allocator(&self) -> &NonceAllocator {
        &self.allocator
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolves module error indices against the connected runtime.
    pub fn resolver(&self) -> &dyn ErrorResolver {
        self.resolver.as_ref()
    }

    pub fn sudo_account(&self) -> Result<&TestAccount> {
        self.sudo
            .as_ref()
            .ok_or_else(|| Error::Config("no sudo account configured".into()))
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Sign `call` with the next nonce of `signer` and submit it.
    pub async fn submit(
        &self,
        call: &Call,
        signer: &TestAccount,
    ) -> Result<TrackedExtrinsic<Inclusion>> {
        let reservation = self.allocator.reserve(self, &signer.account_id()).await?;
        self.submit_reserved(call, signer, reservation).await
    }

    /// Reserve a nonce for a submission made later with [`Self::submit_pending`].
    pub async fn prepare(&self, call: Call, signer: &TestAccount) -> Result<PendingExtrinsic> {
        let reservation = self.allocator.reserve(self, &signer.account_id()).await?;
        Ok(PendingExtrinsic::new(call, signer.clone(), reservation))
    }

    pub async fn submit_pending(
        &self,
        pending: PendingExtrinsic,
    ) -> Result<TrackedExtrinsic<Inclusion>> {
        let (call, signer, reservation) = pending.into_reservation();
        self.submit_reserved(&call, &signer, reservation).await
    }

    /// Submit with a caller-chosen nonce, bypassing the allocator.
    pub async fn submit_with_nonce(
        &self,
        call: &Call,
        signer: &TestAccount,
        nonce: u64,
    ) -> Result<TrackedExtrinsic<Inclusion>> {
        let reservation = NonceReservation {
            nonce,
            state: Arc::new(AtomicNonceState::new_reserved()),
        };
        self.submit_reserved(call, signer, reservation).await
    }

    async fn submit_reserved(
        &self,
        call: &Call,
        signer: &TestAccount,
        reservation: NonceReservation,
    ) -> Result<TrackedExtrinsic<Inclusion>> {
        let account = signer.account_id();
        let NonceReservation { nonce, state } = reservation;
        let params = DefaultExtrinsicParamsBuilder::<ChainConfig>::new()
            .nonce(nonce)
            .build();

        let progress = match self
            .api
            .tx()
            .sign_and_submit_then_watch(call.payload(), signer.keypair(), params)
            .await
        {
            Ok(progress) => progress,
            Err(e) => {
                state.mark_abandoned();
                let error = Error::rejected(e.to_string());
                warn!(%account, nonce, %call, error = %error, "submission rejected");
                return Err(error);
            }
        };

        let extrinsic_hash = progress.extrinsic_hash();
        if let Some(sequencer) = self.allocator.sequencer() {
            sequencer.mark_sent(&account, nonce, extrinsic_hash).await;
        }
        // No-op when the sequencer already moved this slot.
        state.mark_pending();
        debug!(%account, nonce, %call, ?extrinsic_hash, "extrinsic submitted");

        let statuses: StatusStream<Inclusion> = progress
            .map(|status| match status {
                Ok(status) => Ok(SubmissionStatus::from(status)),
                Err(e) => Err(Error::rejected(e.to_string())),
            })
            .boxed();

        Ok(TrackedExtrinsic::new(
            statuses,
            account,
            nonce,
            extrinsic_hash,
            state,
            Arc::clone(&self.resolver),
        )
        .with_sequencer(self.allocator.sequencer().cloned())
        .with_durability(self.config.durability)
        .with_timeout(self.config.inclusion_timeout)
        .with_event_logging(self.config.log_events))
    }

    /// Submit and wait for inclusion. A failed dispatch is still `Ok`.
    pub async fn sign_and_wait(
        &self,
        call: &Call,
        signer: &TestAccount,
    ) -> Result<ExtrinsicReport> {
        self.submit(call, signer).await?.wait().await
    }

    /// Submit, wait, and fail with [`Error::DispatchFailed`] unless the dispatch succeeded.
    pub async fn sign_and_wait_success(
        &self,
        call: &Call,
        signer: &TestAccount,
    ) -> Result<ExtrinsicReport> {
        self.sign_and_wait(call, signer).await?.expect_success()
    }

    /// `Sudo.sudo(call)` signed by the configured sudo account.
    pub async fn sudo(&self, call: Call) -> Result<ExtrinsicReport> {
        let signer = self.sudo_account()?;
        self.sign_and_wait(&sudo::sudo(call), signer).await
    }

    /// `Sudo.sudo_as(who, call)`.
    pub async fn sudo_as(&self, who: &AccountId32, call: Call) -> Result<ExtrinsicReport> {
        let signer = self.sudo_account()?;
        self.sign_and_wait(&sudo::sudo_as(who, call), signer).await
    }

    /// Every call wrapped in `Sudo.sudo` inside one `Utility.batch_all`.
    pub async fn sudo_batch(
        &self,
        calls: impl IntoIterator<Item = Call>,
    ) -> Result<ExtrinsicReport> {
        let signer = self.sudo_account()?;
        self.sign_and_wait(&sudo::sudo_batch(calls), signer).await
    }

    /// [`Self::sudo`], failing unless the wrapped call dispatched successfully.
    pub async fn sudo_success(&self, call: Call) -> Result<ExtrinsicReport> {
        self.sudo(call).await?.expect_sudo_success(self.resolver())
    }

    pub async fn sudo_as_success(&self, who: &AccountId32, call: Call) -> Result<ExtrinsicReport> {
        self.sudo_as(who, call).await?.expect_sudo_success(self.resolver())
    }

    pub async fn sudo_batch_success(
        &self,
        calls: impl IntoIterator<Item = Call>,
    ) -> Result<ExtrinsicReport> {
        self.sudo_batch(calls).await?.expect_sudo_success(self.resolver())
    }

    // ========================================================================
    // Waiting
    // ========================================================================

    /// Event poller over this node.
    pub fn poller(&self, feed: BlockFeed) -> EventPoller<NodeClient> {
        EventPoller::new(self.clone()).with_feed(feed)
    }

    /// Wait for `count` new best blocks.
    pub async fn wait_new_blocks(&self, count: u32) -> Result<BlockEvents> {
        self.poller(BlockFeed::Best).wait_blocks(count).await
    }

    pub async fn wait_block_number(&self, target: u64, max_blocks: u32) -> Result<BlockEvents> {
        self.poller(BlockFeed::Best)
            .wait_block_number(target, max_blocks)
            .await
    }

    /// Wait for a finalized `section.Method` event, optionally containing `data`,
    /// within the configured default budget.
    pub async fn wait_for_event(&self, key: &str, data: Option<&str>) -> Result<EventMatch> {
        let mut filter = EventFilter::parse(key)?;
        if let Some(data) = data {
            filter = filter.with_data(data);
        }
        self.poller(BlockFeed::Finalized)
            .wait_for(filter, self.config.wait_budget)
            .await
    }

    /// Wait until `Bootstrap.Phase` is `phase` (e.g. `"Public"`).
    pub async fn wait_for_bootstrap_phase(
        &self,
        phase: &str,
        max_blocks: u32,
    ) -> Result<BlockEvents> {
        let description = format!("bootstrap phase {phase}");
        self.poller(BlockFeed::Best)
            .wait_until(&description, WaitBudget::blocks(max_blocks), |_| {
                let client = self.clone();
                let phase = phase.to_string();
                async move { Ok(client.bootstrap_phase().await? == phase) }
            })
            .await
    }

    /// Wait until the session index moves past its current value.
    pub async fn wait_for_session_change(&self, max_blocks: u32) -> Result<BlockEvents> {
        let start = self.session_index().await?;
        self.poller(BlockFeed::Best)
            .wait_until("session change", WaitBudget::blocks(max_blocks), |_| {
                let client = self.clone();
                async move { Ok(client.session_index().await? > start) }
            })
            .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Next nonce the chain expects from `account`, including pool transactions.
    pub async fn account_nonce(&self, account: &AccountId32) -> Result<u64> {
        Ok(self.api.tx().account_nonce(account).await?)
    }

    /// Number of the latest finalized block.
    pub async fn block_number(&self) -> Result<u64> {
        let block = self.api.blocks().at_latest().await?;
        Ok(u64::from(block.number()))
    }

    /// Variant name of `Bootstrap.Phase`.
    pub async fn bootstrap_phase(&self) -> Result<String> {
        let value = self.storage_value("Bootstrap", "Phase", Vec::new()).await?;
        match value.map(|v| v.value) {
            Some(ValueDef::Variant(variant)) => Ok(variant.name),
            Some(other) => Err(Error::Decode(format!("Bootstrap.Phase: unexpected {other:?}"))),
            None => Ok("BeforeStart".to_string()),
        }
    }

    pub async fn session_index(&self) -> Result<u32> {
        let value = self.storage_value("Session", "CurrentIndex", Vec::new()).await?;
        let index = value.as_ref().and_then(|v| v.as_u128()).unwrap_or_default();
        u32::try_from(index)
            .map_err(|_| Error::Decode(format!("session index {index} out of range")))
    }

    pub async fn token_balance(
        &self,
        account: &AccountId32,
        token: TokenId,
    ) -> Result<TokenBalance> {
        let keys = vec![calls::account(account), calls::token(token)];
        let Some(value) = self.storage_value("Tokens", "Accounts", keys).await? else {
            return Ok(TokenBalance::default());
        };
        let amount = |field: &str| {
            value_at(&value, field)
                .and_then(|v| v.as_u128())
                .ok_or_else(|| Error::Decode(format!("Tokens.Accounts: missing {field}")))
        };
        Ok(TokenBalance {
            free: amount("free")?,
            reserved: amount("reserved")?,
            frozen: amount("frozen")?,
        })
    }

    /// Number of registered staking candidates.
    pub async fn candidate_pool_size(&self) -> Result<u64> {
        let value = self
            .storage_value("ParachainStaking", "CandidatePool", Vec::new())
            .await?;
        Ok(value.map(|v| sequence_len(&v)).unwrap_or_default() as u64)
    }

    async fn storage_value(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<Value>,
    ) -> Result<Option<Value>> {
        let address = subxt::dynamic::storage(pallet, entry, keys);
        let fetched = self
            .api
            .storage()
            .at_latest()
            .await?
            .fetch(&address)
            .await?;
        match fetched {
            Some(thunk) => {
                let value = thunk
                    .to_value()
                    .map_err(|e| Error::Decode(format!("{pallet}.{entry}: {e}")))?;
                Ok(Some(value.map_context(|_| ())))
            }
            None => Ok(None),
        }
    }

    // ========================================================================
    // Sequence service
    // ========================================================================

    /// Bind a sequence service backed by this node.
    ///
    /// The `candidate` counter starts at the current candidate pool size.
    pub async fn sequence_server(&self, addr: &str) -> Result<SequenceServer> {
        let candidates = self.candidate_pool_size().await?;
        Ok(SequenceServer::bind(addr, Arc::new(self.clone()))
            .await?
            .with_counter(CANDIDATE_COUNTER, candidates))
    }
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("allocator", &self.allocator)
            .field("config", &self.config)
            .field("sudo", &self.sudo)
            .finish()
    }
}

/// Length of a decoded sequence, looking through a single-field newtype
/// such as `BoundedVec`.
fn sequence_len(value: &Value) -> usize {
    match &value.value {
        ValueDef::Composite(Composite::Unnamed(items)) => match items.as_slice() {
            [inner @ Value {
                value: ValueDef::Composite(Composite::Unnamed(_)),
                ..
            }] => sequence_len(inner),
            _ => items.len(),
        },
        _ => 0,
    }
}

// ============================================================================
// Seam implementations
// ============================================================================

#[async_trait]
impl NonceSource for NodeClient {
    async fn account_nonce(&self, account: &AccountId32) -> Result<u64> {
        NodeClient::account_nonce(self, account).await
    }
}

#[async_trait]
impl BlockSource for NodeClient {
    async fn blocks(&self, feed: BlockFeed) -> Result<BlockStream> {
        let blocks = match feed {
            BlockFeed::Finalized => self.api.blocks().subscribe_finalized().await?,
            BlockFeed::Best => self.api.blocks().subscribe_best().await?,
        };
        Ok(blocks
            .then(|block| async move {
                let block = block?;
                let events = block.events().await?;
                let events = events
                    .iter()
                    .map(|details| {
                        let details = details.map_err(|e| Error::Decode(e.to_string()))?;
                        EventRecord::from_details(&details)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok::<_, Error>(BlockEvents {
                    number: u64::from(block.number()),
                    hash: block.hash(),
                    events,
                })
            })
            .boxed())
    }
}

#[async_trait]
impl InclusionHandle for Inclusion {
    fn block_hash(&self) -> H256 {
        TxInBlock::block_hash(self)
    }

    fn extrinsic_hash(&self) -> H256 {
        TxInBlock::extrinsic_hash(self)
    }

    async fn events(&self) -> Result<Vec<EventRecord>> {
        let events = self.fetch_events().await?;
        events
            .iter()
            .map(|details| EventRecord::from_details(&details?))
            .collect()
    }
}

impl From<TxStatus<ChainConfig, ChainApi>> for SubmissionStatus<Inclusion> {
    fn from(status: TxStatus<ChainConfig, ChainApi>) -> Self {
        match status {
            TxStatus::Validated => SubmissionStatus::Validated,
            TxStatus::Broadcasted { .. } => SubmissionStatus::Broadcast,
            TxStatus::NoLongerInBestBlock => SubmissionStatus::Retracted,
            TxStatus::InBestBlock(block) => SubmissionStatus::InBestBlock(block),
            TxStatus::InFinalizedBlock(block) => SubmissionStatus::Finalized(block),
            TxStatus::Error { message } => SubmissionStatus::Error(message),
            TxStatus::Invalid { message } => SubmissionStatus::Invalid(message),
            TxStatus::Dropped { message } => SubmissionStatus::Dropped(message),
        }
    }
}
