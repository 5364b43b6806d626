//! Nonce lifecycle test scenario framework.
//!
//! This module provides `NonceScenario` for checking how slot states end up
//! when a signer's extrinsics are confirmed, rejected, dropped or left stuck.

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::{
    account::TestAccount,
    nonce::{nonce_state, AtomicNonceState, NonceSequencer, NonceStatus},
    submit::TrackedExtrinsic,
};

use super::{MockChain, MockInclusion, MockOutcome};

// ============================================================================
// TxAction
// ============================================================================

/// What happens to an extrinsic during the scenario
#[derive(Debug, Clone, PartialEq)]
pub enum TxAction {
    /// Included; `wait()` is called
    Confirm,
    /// Pool rejects it with the message; `wait()` is called
    Reject(String),
    /// Included, but the `TrackedExtrinsic` is dropped without `wait()`
    DropUnawaited,
    /// Never progresses; kept alive until the end
    LeaveStuck,
}

// ============================================================================
// ExpectedNonceState
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedNonceState {
    Confirmed,
    Abandoned,
    Pending,
}

impl ExpectedNonceState {
    pub(crate) fn matches(&self, state: u8) -> bool {
        match self {
            ExpectedNonceState::Confirmed => state == nonce_state::CONFIRMED,
            ExpectedNonceState::Abandoned => state == nonce_state::ABANDONED,
            ExpectedNonceState::Pending => state == nonce_state::PENDING,
        }
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self {
            ExpectedNonceState::Confirmed => "CONFIRMED",
            ExpectedNonceState::Abandoned => "ABANDONED",
            ExpectedNonceState::Pending => "PENDING",
        }
    }
}

// ============================================================================
// TxSpec
// ============================================================================

#[derive(Debug, Clone)]
pub struct TxSpec {
    pub name: String,
    pub action: TxAction,
    pub expected_state: ExpectedNonceState,
}

impl TxSpec {
    pub fn new(name: impl Into<String>, action: TxAction, expected: ExpectedNonceState) -> Self {
        Self {
            name: name.into(),
            action,
            expected_state: expected,
        }
    }

    pub fn confirm(name: impl Into<String>) -> Self {
        Self::new(name, TxAction::Confirm, ExpectedNonceState::Confirmed)
    }

    /// Rejected by the pool with `message`, e.g. `"Transaction is outdated"`
    pub fn reject(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            name,
            TxAction::Reject(message.into()),
            ExpectedNonceState::Abandoned,
        )
    }

    pub fn drop_unawaited(name: impl Into<String>) -> Self {
        Self::new(name, TxAction::DropUnawaited, ExpectedNonceState::Abandoned)
    }

    pub fn leave_stuck(name: impl Into<String>) -> Self {
        Self::new(name, TxAction::LeaveStuck, ExpectedNonceState::Pending)
    }

    fn outcome(&self) -> MockOutcome {
        match &self.action {
            TxAction::Confirm | TxAction::DropUnawaited => MockOutcome::success(),
            TxAction::Reject(message) => MockOutcome::invalid(message.clone()),
            TxAction::LeaveStuck => MockOutcome::Stalled,
        }
    }
}

// ============================================================================
// TxRuntime
// ============================================================================

struct TxRuntime {
    spec: TxSpec,
    nonce: u64,
    tracked: Option<TrackedExtrinsic<MockInclusion>>,
    atomic_state: Arc<AtomicNonceState>,
}

// ============================================================================
// NonceScenario
// ============================================================================

/// A configurable test scenario for nonce lifecycles of one signer
///
/// # Example
///
/// ```ignore
/// NonceScenario::new("Rejection in middle")
///     .description("Middle extrinsic is rejected, the others are included")
///     .tx(TxSpec::confirm("tx0"))
///     .tx(TxSpec::reject("tx1", "Transaction is outdated"))
///     .tx(TxSpec::confirm("tx2"))
///     .run(&chain)
///     .await
///     .unwrap()
///     .assert_passed();
/// ```
pub struct NonceScenario {
    name: String,
    description: Option<String>,
    signer: Option<TestAccount>,
    tx_specs: Vec<TxSpec>,
}

impl NonceScenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            signer: None,
            tx_specs: Vec::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Sign with `signer` instead of a fresh random account.
    pub fn signer(mut self, signer: TestAccount) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn tx(mut self, spec: TxSpec) -> Self {
        self.tx_specs.push(spec);
        self
    }

    /// Run the scenario and verify results
    pub async fn run(self, chain: &MockChain) -> Result<ScenarioResult> {
        println!("\n{}", "=".repeat(60));
        println!("Scenario: {}", self.name);
        if let Some(desc) = &self.description {
            println!("Description: {}", desc);
        }
        println!("{}\n", "=".repeat(60));

        let signer = match self.signer {
            Some(signer) => signer,
            None => TestAccount::random()?,
        };
        let account = signer.account_id();
        let sequencer = NonceSequencer::new();

        // Phase 1: Submit everything before anything is awaited
        println!("Phase 1: Submitting {} extrinsics...", self.tx_specs.len());
        let mut runtimes: Vec<TxRuntime> = Vec::new();

        for (i, spec) in self.tx_specs.into_iter().enumerate() {
            let tracked = chain.submit(&sequencer, &signer, spec.outcome()).await?;
            let nonce = tracked.nonce();
            let atomic_state = Arc::clone(tracked.atomic_state());

            println!(
                "  [{}] '{}' submitted with nonce {} (action: {:?})",
                i, spec.name, nonce, spec.action
            );

            runtimes.push(TxRuntime {
                spec,
                nonce,
                tracked: Some(tracked),
                atomic_state,
            });
        }

        // Phase 2: Drop the extrinsics nobody waits for
        println!("\nPhase 2: Dropping unawaited extrinsics...");
        for runtime in &mut runtimes {
            if runtime.spec.action == TxAction::DropUnawaited {
                runtime.tracked.take();
                println!(
                    "  [{}] '{}' TrackedExtrinsic dropped -> ABANDONED",
                    runtime.nonce, runtime.spec.name
                );
            }
        }

        // Phase 3: Wait for the rest
        println!("\nPhase 3: Waiting...");
        for runtime in &mut runtimes {
            if matches!(runtime.spec.action, TxAction::Confirm | TxAction::Reject(_)) {
                if let Some(tracked) = runtime.tracked.take() {
                    match tracked.wait().await {
                        Ok(report) => println!(
                            "  [{}] '{}' included in {:?}",
                            runtime.nonce, runtime.spec.name, report.block_hash
                        ),
                        Err(e) => println!(
                            "  [{}] '{}' wait() failed: {}",
                            runtime.nonce, runtime.spec.name, e
                        ),
                    }
                }
            }
        }

        // Phase 4: Verify results
        println!("\nPhase 4: Verifying results...");
        let mut all_passed = true;
        let mut results = Vec::new();

        for runtime in &runtimes {
            let actual_state = runtime.atomic_state.get();
            let expected = &runtime.spec.expected_state;
            let passed = expected.matches(actual_state);

            let status = if passed { "PASS" } else { "FAIL" };
            println!(
                "  {} [{}] '{}': expected {}, got {}",
                status,
                runtime.nonce,
                runtime.spec.name,
                expected.state_name(),
                nonce_state::name(actual_state)
            );

            if !passed {
                all_passed = false;
            }

            results.push(TxResult {
                name: runtime.spec.name.clone(),
                nonce: runtime.nonce,
                expected_state: runtime.spec.expected_state,
                actual_state,
                passed,
            });
        }

        // Phase 5: Sequencer status
        println!("\nPhase 5: Sequencer status...");
        let status = sequencer
            .status(&account)
            .await
            .ok_or_else(|| anyhow!("no sequencer record for {}", account))?;
        println!(
            "  initial_nonce={}, next_nonce={}, pending={:?}, abandoned={:?}",
            status.initial_nonce, status.next_nonce, status.pending_nonces, status.abandoned_nonces
        );

        println!("\n{}", "=".repeat(60));
        if all_passed {
            println!("Result: ALL PASSED");
        } else {
            println!("Result: SOME FAILED");
        }
        println!("{}\n", "=".repeat(60));

        Ok(ScenarioResult {
            name: self.name,
            all_passed,
            tx_results: results,
            nonce_status: status,
        })
    }
}

// ============================================================================
// TxResult
// ============================================================================

#[derive(Debug)]
pub struct TxResult {
    pub name: String,
    pub nonce: u64,
    pub expected_state: ExpectedNonceState,
    pub actual_state: u8,
    pub passed: bool,
}

// ============================================================================
// ScenarioResult
// ============================================================================

#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub all_passed: bool,
    pub tx_results: Vec<TxResult>,
    pub nonce_status: NonceStatus,
}

impl ScenarioResult {
    pub fn assert_passed(&self) {
        assert!(
            self.all_passed,
            "Scenario '{}' failed: {:?}",
            self.name,
            self.tx_results
                .iter()
                .filter(|r| !r.passed)
                .collect::<Vec<_>>()
        );
    }
}
