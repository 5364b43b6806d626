//! Error scenario tests for the submission flow.
//!
//! Organized by where the failure shows up:
//!
//! - Phase 1: nonce allocation (node unreachable)
//! - Phase 2: pool rejection before inclusion (stale, fees, dropped)
//! - Phase 3: waiting (stream closed, inclusion timeout, condition not met)
//! - Phase 4: execution results (module error inside an included extrinsic)
//!
//! Test naming convention:
//! - `test_e{N}_{error_name}` - Single error scenario
//! - `test_r{N}_{result_name}` - Execution result scenario
//! - `test_{compound_scenario}` - Compound scenarios

use std::{sync::Arc, time::Duration};

use futures::{stream, StreamExt};
use subxt::ext::scale_value::{Composite, Value};

use super::{event, module_error, system_event, MockChain, MockOutcome, MockResolver};
use crate::{
    account::TestAccount,
    error::{is_timeout_error, Error, RejectionKind, WaitLimit},
    events::{EventFilter, EventKey, EventPhase, EventRecord},
    nonce::NonceSequencer,
    poller::{BlockStream, EventPoller, EventWatch, WaitBudget},
    report::{ExtrinsicOutcome, ExtrinsicReport},
};

// ============================================================================
// Phase 1: Allocation Errors
// ============================================================================

/// E1: Node unreachable when the first nonce is read
///
/// Expected: setup error, no record left behind, next attempt reads the chain again
#[test_log::test(tokio::test)]
async fn test_e1_node_unavailable() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let user = TestAccount::random().unwrap();
    chain.set_unavailable(true);

    println!("\n=== E1: Node Unavailable ===\n");

    let err = sequencer
        .next_nonce(&chain, &user.account_id())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NodeUnavailable(_)), "got {err:?}");
    assert!(err.is_setup_error());
    assert!(sequencer.status(&user.account_id()).await.is_none());

    chain.set_unavailable(false);
    chain.set_nonce(&user.account_id(), 4);
    assert_eq!(sequencer.next_nonce(&chain, &user.account_id()).await.unwrap(), 4);
    assert_eq!(chain.nonce_queries(), 2);
    println!("PASSED: unreachable node leaves no nonce record\n");
}

// ============================================================================
// Phase 2: Pool Rejections
// ============================================================================

/// E2: Stale nonce rejected by the pool
///
/// Expected: Rejected(Stale), nonce abandoned and not handed out again
#[test_log::test(tokio::test)]
async fn test_e2_stale_rejection() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let user = TestAccount::random().unwrap();

    println!("\n=== E2: Stale Rejection ===\n");

    let tracked = chain
        .submit(
            &sequencer,
            &user,
            MockOutcome::invalid("Invalid Transaction: Transaction is outdated"),
        )
        .await
        .unwrap();
    let nonce = tracked.nonce();

    let err = tracked.wait().await.unwrap_err();
    let kind = err.rejection_kind().expect("rejection");
    assert_eq!(kind, RejectionKind::Stale);
    assert!(kind.is_nonce_related());

    assert_eq!(sequencer.abandoned_nonces(&user.account_id()).await, vec![nonce]);
    let next = sequencer.next_nonce(&chain, &user.account_id()).await.unwrap();
    assert_eq!(next, nonce + 1, "abandoned nonce must not be reissued");
    println!("PASSED: stale rejection abandons nonce {nonce}\n");
}

/// E3: Signer cannot pay fees
#[test_log::test(tokio::test)]
async fn test_e3_insufficient_funds() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let user = TestAccount::random().unwrap();

    let err = chain
        .submit(
            &sequencer,
            &user,
            MockOutcome::invalid(
                "Invalid Transaction: Inability to pay some fees (e.g. account balance too low)",
            ),
        )
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();

    assert_eq!(err.rejection_kind(), Some(RejectionKind::InsufficientFunds));
    assert!(!err.is_setup_error());
}

/// E4: Extrinsic dropped from the pool
#[test_log::test(tokio::test)]
async fn test_e4_dropped() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let user = TestAccount::random().unwrap();

    let tracked = chain
        .submit(
            &sequencer,
            &user,
            MockOutcome::Dropped("Transaction dropped: pool limits reached".into()),
        )
        .await
        .unwrap();
    let state = Arc::clone(tracked.atomic_state());

    let err = tracked.wait().await.unwrap_err();
    assert!(matches!(err, Error::Rejected { .. }), "got {err:?}");
    assert!(state.is_abandoned());
}

// ============================================================================
// Phase 3: Waiting Errors
// ============================================================================

/// E5: Status subscription ends before inclusion
#[test_log::test(tokio::test)]
async fn test_e5_subscription_closed() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let user = TestAccount::random().unwrap();

    let tracked = chain
        .submit(&sequencer, &user, MockOutcome::ClosedEarly)
        .await
        .unwrap();
    let nonce = tracked.nonce();

    assert!(matches!(tracked.wait().await, Err(Error::SubscriptionClosed)));
    assert_eq!(sequencer.abandoned_nonces(&user.account_id()).await, vec![nonce]);
}

/// E6: Inclusion timeout
///
/// Scenario: the node never reports progress past broadcast
/// Expected: time-limit ConditionNotMet, nonce abandoned
#[test_log::test(tokio::test)]
async fn test_e6_inclusion_timeout() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let user = TestAccount::random().unwrap();

    println!("\n=== E6: Inclusion Timeout ===\n");

    let tracked = chain
        .submit(&sequencer, &user, MockOutcome::Stalled)
        .await
        .unwrap()
        .with_timeout(Some(Duration::from_millis(100)));
    let nonce = tracked.nonce();

    let err = tracked.wait().await.unwrap_err();
    match &err {
        Error::ConditionNotMet { limit, .. } => {
            assert_eq!(*limit, WaitLimit::Time(Duration::from_millis(100)))
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(is_timeout_error(&anyhow::Error::new(err)));

    let status = sequencer.status(&user.account_id()).await.unwrap();
    println!("Nonce status: abandoned={:?}", status.abandoned_nonces);
    assert!(status.abandoned_nonces.contains(&nonce));
    println!("PASSED: timeout marks nonce as abandoned\n");
}

/// E7: Awaited event never fires
#[test_log::test(tokio::test)]
async fn test_e7_condition_not_met() {
    let chain = MockChain::new();
    chain.script_blocks([vec![event("Xyk", "AssetsSwapped", vec![])]]);

    let err = EventPoller::new(chain.clone())
        .wait_for(EventFilter::from(EventKey::new("xyk", "PoolCreated")), WaitBudget::blocks(3))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "xyk.PoolCreated not found within blocks limit");
    match err {
        Error::ConditionNotMet { blocks_observed, .. } => assert_eq!(blocks_observed, 3),
        other => panic!("unexpected {other:?}"),
    }
}

/// E8: Wall-clock budget on an event wait
///
/// Scenario: the block feed goes silent
/// Expected: time-limit ConditionNotMet without a single block observed
#[test_log::test(tokio::test)]
async fn test_e8_time_budget_on_silent_feed() {
    let silent: BlockStream = stream::pending().boxed();
    let watch = EventWatch::new(
        silent,
        EventFilter::parse("xyk.PoolCreated").unwrap(),
        WaitBudget::time(Duration::from_millis(50)),
    );

    let err = watch.first_match().await.unwrap_err();
    assert_eq!(err.to_string(), "xyk.PoolCreated not found within time limit (50ms)");
    match err {
        Error::ConditionNotMet { blocks_observed, .. } => assert_eq!(blocks_observed, 0),
        other => panic!("unexpected {other:?}"),
    }
}

// ============================================================================
// Phase 4: Execution Results
// ============================================================================

/// R1: Module error inside an included extrinsic
///
/// Expected: wait() is Ok, the report carries the decoded error, nonce confirmed
#[test_log::test(tokio::test)]
async fn test_r1_module_error_is_included() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let user = TestAccount::random().unwrap();

    println!("\n=== R1: Module Error ===\n");

    let tracked = chain
        .submit(&sequencer, &user, MockOutcome::module_failure(13, 3))
        .await
        .unwrap();
    let state = Arc::clone(tracked.atomic_state());

    let report = tracked.wait().await.unwrap();
    assert!(state.is_confirmed(), "included extrinsic confirms its nonce");

    let ExtrinsicOutcome::Failed(failure) = report.outcome().clone() else {
        panic!("expected failure, got {:?}", report.outcome());
    };
    assert_eq!(failure.to_string(), "Xyk.PoolAlreadyExists");

    match report.expect_success() {
        Err(Error::DispatchFailed(f)) => assert!(f.is("Xyk", "PoolAlreadyExists")),
        other => panic!("unexpected {other:?}"),
    }
    println!("PASSED: module error surfaced in report\n");
}

/// R2: Sudo call whose inner dispatch failed
#[test_log::test(tokio::test)]
async fn test_r2_sudo_inner_failure() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let sudo = TestAccount::alice();

    let sudid = EventRecord::new(
        "Sudo",
        "Sudid",
        EventPhase::ApplyExtrinsic(1),
        Composite::Named(vec![(
            "sudo_result".into(),
            Value::unnamed_variant("Err", [module_error(13, 10)]),
        )]),
    );
    let report: ExtrinsicReport = chain
        .submit(&sequencer, &sudo, MockOutcome::success_with(vec![sudid]))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    // The outer extrinsic succeeded
    assert!(report.is_success());
    let inner = report.sudo_outcome(&MockResolver).expect("Sudid event");
    assert_eq!(inner.unwrap_err().to_string(), "Xyk.NotEnoughAssets");
}

// ============================================================================
// Compound Scenarios
// ============================================================================

/// Nonce abandoned by drop, yet a later nonce is included: the chain must
/// have consumed the lower one too.
#[test_log::test(tokio::test)]
async fn test_abandoned_but_confirmed() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let user = TestAccount::random().unwrap();

    let first = chain
        .submit(&sequencer, &user, MockOutcome::success())
        .await
        .unwrap();
    let first_state = Arc::clone(first.atomic_state());
    drop(first);
    assert!(first_state.is_abandoned());

    chain
        .submit(&sequencer, &user, MockOutcome::success())
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(first_state.is_confirmed());
    let status = sequencer.status(&user.account_id()).await.unwrap();
    assert_eq!(status.abandoned_count(), 0);
    assert_eq!(status.pending_count(), 0);
}

/// A rejection leaves a gap; `reset()` re-reads the chain and the gap nonce
/// is used by the next extrinsic.
#[test_log::test(tokio::test)]
async fn test_gap_recovery_and_continue() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let user = TestAccount::random().unwrap();

    chain
        .submit(&sequencer, &user, MockOutcome::success())
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let rejected = chain
        .submit(&sequencer, &user, MockOutcome::invalid("Priority is too low: (1 vs 1)"))
        .await
        .unwrap();
    let gap = rejected.nonce();
    assert!(rejected.wait().await.is_err());

    assert_eq!(chain.on_chain_nonce(&user.account_id()), gap);
    sequencer.reset(&user.account_id());

    let retried = chain
        .submit(&sequencer, &user, MockOutcome::success())
        .await
        .unwrap();
    assert_eq!(retried.nonce(), gap);
    assert!(retried.wait().await.unwrap().is_success());
}

/// Concurrent submissions with one rejection in the middle of the batch
#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_with_failure() {
    let chain = MockChain::new();
    let sequencer = NonceSequencer::new();
    let sudo = TestAccount::alice();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let chain = chain.clone();
            let sequencer = sequencer.clone();
            let sudo = sudo.clone();
            tokio::spawn(async move {
                let outcome = if i == 4 {
                    MockOutcome::invalid("Transaction has a bad signature")
                } else {
                    MockOutcome::Included(vec![system_event("ExtrinsicSuccess", Vec::new())])
                };
                let tracked = chain.submit(&sequencer, &sudo, outcome).await.unwrap();
                let nonce = tracked.nonce();
                (nonce, tracked.wait().await.is_ok())
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results.sort();

    let nonces: Vec<u64> = results.iter().map(|(n, _)| *n).collect();
    assert_eq!(nonces, (0..8).collect::<Vec<_>>());
    assert_eq!(results.iter().filter(|(_, ok)| !ok).count(), 1);
}
