//! Waiting for events and chain state.
//!
//! An [`EventWatch`] subscribes to a block feed and yields, block by block,
//! the events matching a filter. It is finite: it ends once its
//! [`WaitBudget`] is spent, and pulls no block past the budget.
//!
//! ```text
//!   Subscribed ──(matching block)──► Matched
//!        │
//!        └──(budget spent)──► TimedOut (ConditionNotMet)
//! ```
//!
//! Matches in a block are checked before the budget is, so an event in the
//! last budgeted block still counts. Dropping a watch cancels it.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use futures::{stream, stream::BoxStream, Stream, StreamExt};
use subxt::utils::H256;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{
    error::{Error, Result, WaitLimit},
    events::{EventFilter, EventRecord},
};

// ============================================================================
// Block feed
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockFeed {
    #[default]
    Finalized,
    /// New best blocks, which may later be retracted
    Best,
}

/// All events of one block.
#[derive(Debug, Clone)]
pub struct BlockEvents {
    pub number: u64,
    pub hash: H256,
    pub events: Vec<EventRecord>,
}

pub type BlockStream = BoxStream<'static, Result<BlockEvents>>;

/// A subscription to new blocks together with their events.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn blocks(&self, feed: BlockFeed) -> Result<BlockStream>;
}

// ============================================================================
// WaitBudget
// ============================================================================

/// Upper bound on a wait: a number of blocks, a wall-clock duration, or both
/// (whichever runs out first).
///
/// Built only through the constructors, so at least one bound is always set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitBudget {
    blocks: Option<u32>,
    duration: Option<Duration>,
}

impl WaitBudget {
    pub fn blocks(blocks: u32) -> Self {
        Self {
            blocks: Some(blocks),
            duration: None,
        }
    }

    pub fn time(duration: Duration) -> Self {
        Self {
            blocks: None,
            duration: Some(duration),
        }
    }

    pub fn both(blocks: u32, duration: Duration) -> Self {
        Self {
            blocks: Some(blocks),
            duration: Some(duration),
        }
    }

    pub fn max_blocks(&self) -> Option<u32> {
        self.blocks
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.duration
    }
}

impl Default for WaitBudget {
    fn default() -> Self {
        Self::blocks(10)
    }
}

// ============================================================================
// EventMatch
// ============================================================================

/// Matching events found in one block, in execution order.
#[derive(Debug, Clone)]
pub struct EventMatch {
    pub block_number: u64,
    pub block_hash: H256,
    pub events: Vec<EventRecord>,
}

impl EventMatch {
    /// The earliest matching event in the block.
    pub fn first(&self) -> &EventRecord {
        &self.events[0]
    }
}

// ============================================================================
// EventWatch
// ============================================================================

pub struct EventWatch {
    blocks: BlockStream,
    filter: EventFilter,
    budget: WaitBudget,
    deadline: Option<Instant>,
    observed: u32,
    exhausted: Option<WaitLimit>,
    closed: bool,
}

impl EventWatch {
    pub fn new(blocks: BlockStream, filter: EventFilter, budget: WaitBudget) -> Self {
        Self {
            blocks,
            filter,
            budget,
            deadline: budget.duration.map(|d| Instant::now() + d),
            observed: 0,
            exhausted: None,
            closed: false,
        }
    }

    /// Blocks pulled from the feed so far.
    pub fn blocks_observed(&self) -> u32 {
        self.observed
    }

    /// Which limit ended the watch, once it has ended by budget.
    pub fn exhausted_by(&self) -> Option<WaitLimit> {
        self.exhausted
    }

    /// Next block with matching events, or `None` once the budget is spent.
    pub async fn next_match(&mut self) -> Option<Result<EventMatch>> {
        loop {
            if self.closed || self.exhausted.is_some() {
                return None;
            }
            if let Some(max) = self.budget.blocks {
                if self.observed >= max {
                    self.exhausted = Some(WaitLimit::Blocks(max));
                    return None;
                }
            }

            let next = match (self.deadline, self.budget.duration) {
                (Some(deadline), Some(limit)) => {
                    match tokio::time::timeout_at(deadline, self.blocks.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            self.exhausted = Some(WaitLimit::Time(limit));
                            return None;
                        }
                    }
                }
                _ => self.blocks.next().await,
            };

            let block = match next {
                Some(Ok(block)) => block,
                Some(Err(e)) => {
                    self.closed = true;
                    return Some(Err(e));
                }
                None => {
                    self.closed = true;
                    return Some(Err(Error::SubscriptionClosed));
                }
            };

            self.observed += 1;
            trace!(
                filter = %self.filter,
                block = block.number,
                observed = self.observed,
                "checking block"
            );

            let events: Vec<EventRecord> = block
                .events
                .into_iter()
                .filter(|e| self.filter.matches(e))
                .collect();
            if !events.is_empty() {
                debug!(
                    filter = %self.filter,
                    block = block.number,
                    count = events.len(),
                    "event matched"
                );
                return Some(Ok(EventMatch {
                    block_number: block.number,
                    block_hash: block.hash,
                    events,
                }));
            }
        }
    }

    /// The first match, or [`Error::ConditionNotMet`] naming the filter.
    pub async fn first_match(mut self) -> Result<EventMatch> {
        match self.next_match().await {
            Some(result) => result,
            None => Err(self.not_met()),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<EventMatch>> + Send {
        stream::unfold(self, |mut watch| async move {
            watch.next_match().await.map(|item| (item, watch))
        })
    }

    fn not_met(&self) -> Error {
        Error::ConditionNotMet {
            condition: self.filter.to_string(),
            limit: self
                .exhausted
                .unwrap_or(WaitLimit::Blocks(self.observed)),
            blocks_observed: self.observed,
        }
    }
}

// ============================================================================
// EventPoller
// ============================================================================

pub struct EventPoller<S> {
    source: S,
    feed: BlockFeed,
}

impl<S: BlockSource> EventPoller<S> {
    /// Poller over finalized blocks.
    pub fn new(source: S) -> Self {
        Self {
            source,
            feed: BlockFeed::Finalized,
        }
    }

    pub fn with_feed(mut self, feed: BlockFeed) -> Self {
        self.feed = feed;
        self
    }

    pub async fn watch(&self, filter: EventFilter, budget: WaitBudget) -> Result<EventWatch> {
        let blocks = self.source.blocks(self.feed).await?;
        Ok(EventWatch::new(blocks, filter, budget))
    }

    /// Wait for the first block containing a matching event.
    pub async fn wait_for(&self, filter: EventFilter, budget: WaitBudget) -> Result<EventMatch> {
        debug!(%filter, ?budget, "waiting for event");
        self.watch(filter, budget).await?.first_match().await
    }

    /// Every match within the budget. Running out of budget is not an error.
    pub async fn collect(
        &self,
        filter: EventFilter,
        budget: WaitBudget,
    ) -> Result<Vec<EventMatch>> {
        let mut watch = self.watch(filter, budget).await?;
        let mut matches = Vec::new();
        while let Some(item) = watch.next_match().await {
            matches.push(item?);
        }
        Ok(matches)
    }

    /// Evaluate `probe` after each block until it returns `true`.
    ///
    /// Returns the block at which the condition first held.
    pub async fn wait_until<F, Fut>(
        &self,
        description: &str,
        budget: WaitBudget,
        mut probe: F,
    ) -> Result<BlockEvents>
    where
        F: FnMut(&BlockEvents) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        debug!(condition = description, ?budget, "waiting for condition");
        let mut blocks = self.source.blocks(self.feed).await?;
        let deadline = budget.duration.map(|d| Instant::now() + d);
        let mut observed = 0u32;

        loop {
            if let Some(max) = budget.blocks {
                if observed >= max {
                    return Err(Error::ConditionNotMet {
                        condition: description.to_string(),
                        limit: WaitLimit::Blocks(max),
                        blocks_observed: observed,
                    });
                }
            }

            let next = match (deadline, budget.duration) {
                (Some(deadline), Some(limit)) => {
                    match tokio::time::timeout_at(deadline, blocks.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            return Err(Error::ConditionNotMet {
                                condition: description.to_string(),
                                limit: WaitLimit::Time(limit),
                                blocks_observed: observed,
                            })
                        }
                    }
                }
                _ => blocks.next().await,
            };

            let block = next.ok_or(Error::SubscriptionClosed)??;
            observed += 1;
            if probe(&block).await? {
                debug!(condition = description, block = block.number, "condition met");
                return Ok(block);
            }
        }
    }

    /// Wait until `count` more blocks have been produced on this feed.
    ///
    /// A block is always pulled, so a `count` of 0 waits like a `count` of 1.
    pub async fn wait_blocks(&self, count: u32) -> Result<BlockEvents> {
        let count = count.max(1);
        let mut seen = 0u32;
        self.wait_until(
            &format!("{count} new blocks"),
            WaitBudget::blocks(count),
            move |_| {
                seen += 1;
                let done = seen >= count;
                async move { Ok(done) }
            },
        )
        .await
    }

    /// Wait until the feed reaches block `target`.
    pub async fn wait_block_number(&self, target: u64, max_blocks: u32) -> Result<BlockEvents> {
        self.wait_until(
            &format!("block #{target}"),
            WaitBudget::blocks(max_blocks),
            |block| {
                let reached = block.number >= target;
                async move { Ok(reached) }
            },
        )
        .await
    }
}
