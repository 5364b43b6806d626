//! Outcome of an included extrinsic.
//!
//! Inclusion and dispatch success are separate facts. A report is produced for
//! every included extrinsic; whether its logic succeeded is read from the
//! `System.ExtrinsicSuccess` / `System.ExtrinsicFailed` marker among its
//! events, with module errors resolved to `Pallet.Error` names.
//!
//! ```ignore
//! let report = client.sign_and_wait(&xyk::create_pool(a, 1_000, b, 2_000), &user).await?;
//! match report.outcome() {
//!     ExtrinsicOutcome::Success => {}
//!     ExtrinsicOutcome::Failed(err) => assert_eq!(err.to_string(), "Xyk.PoolAlreadyExists"),
//!     ExtrinsicOutcome::Undefined => panic!("no marker event"),
//! }
//! ```

use std::fmt;

use subxt::{
    ext::scale_value::{Composite, Value, ValueDef},
    utils::H256,
    Metadata,
};

use crate::{
    error::{Error, Result},
    events::{value_at, EventFilter, EventKey, EventRecord},
};

// ============================================================================
// Error name resolution
// ============================================================================

/// Map `(pallet index, error index)` to `(pallet name, error name)`.
pub trait ErrorResolver: Send + Sync {
    fn module_error(&self, pallet_index: u8, error_index: u8) -> Option<(String, String)>;
}

impl ErrorResolver for Metadata {
    fn module_error(&self, pallet_index: u8, error_index: u8) -> Option<(String, String)> {
        let pallet = self.pallet_by_index(pallet_index)?;
        let variant = pallet.error_variant_by_index(error_index)?;
        Some((pallet.name().to_string(), variant.name.clone()))
    }
}

/// No metadata at hand; module errors keep their raw indices.
impl ErrorResolver for () {
    fn module_error(&self, _pallet_index: u8, _error_index: u8) -> Option<(String, String)> {
        None
    }
}

// ============================================================================
// DispatchFailure
// ============================================================================

/// A decoded `DispatchError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    /// Pallet name for module errors
    pub pallet: Option<String>,
    /// Error name, or the `DispatchError` variant for non-module errors
    pub error: String,
    /// Raw `(pallet index, error index)` for module errors
    pub module: Option<(u8, u8)>,
}

impl DispatchFailure {
    /// Decode a `DispatchError` value.
    pub fn decode(value: &Value<()>, resolver: &dyn ErrorResolver) -> Self {
        let ValueDef::Variant(variant) = &value.value else {
            return Self::other(value.to_string());
        };

        if variant.name != "Module" {
            let error = match variant.values.values().next() {
                // Token(FundsUnavailable), Arithmetic(Overflow), ...
                Some(Value { value: ValueDef::Variant(inner), .. }) => {
                    format!("{}({})", variant.name, inner.name)
                }
                _ => variant.name.clone(),
            };
            return Self::other(error);
        }

        let Some(module) = variant.values.values().next() else {
            return Self::other("Module");
        };
        let pallet_index = value_at(module, "index").and_then(|v| v.as_u128());
        let error_index = value_at(module, "error").and_then(first_byte);

        match (pallet_index, error_index) {
            (Some(p), Some(e)) if p <= u8::MAX as u128 => {
                let (p, e) = (p as u8, e);
                match resolver.module_error(p, e) {
                    Some((pallet, error)) => Self {
                        pallet: Some(pallet),
                        error,
                        module: Some((p, e)),
                    },
                    None => Self {
                        pallet: None,
                        error: format!("Module(index={p}, error={e})"),
                        module: Some((p, e)),
                    },
                }
            }
            _ => Self::other(module.to_string()),
        }
    }

    fn other(error: impl Into<String>) -> Self {
        Self {
            pallet: None,
            error: error.into(),
            module: None,
        }
    }

    /// Whether this is the named module error, e.g. `is("Xyk", "PoolAlreadyExists")`.
    pub fn is(&self, pallet: &str, error: &str) -> bool {
        self.pallet
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(pallet))
            && self.error == error
    }
}

/// Older runtimes encode the module error index as a single `u8`, newer ones
/// as `[u8; 4]` whose first byte is the index.
fn first_byte(value: &Value<()>) -> Option<u8> {
    if let Some(n) = value.as_u128() {
        return u8::try_from(n).ok();
    }
    match &value.value {
        ValueDef::Composite(c) => c
            .values()
            .next()
            .and_then(|v| v.as_u128())
            .and_then(|n| u8::try_from(n).ok()),
        _ => None,
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pallet {
            Some(pallet) => write!(f, "{}.{}", pallet, self.error),
            None => f.write_str(&self.error),
        }
    }
}

// ============================================================================
// ExtrinsicOutcome
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtrinsicOutcome {
    Success,
    Failed(DispatchFailure),
    /// Neither marker event was found among the events
    Undefined,
}

impl ExtrinsicOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtrinsicOutcome::Success)
    }
}

// ============================================================================
// ExtrinsicReport
// ============================================================================

/// Events emitted by one included extrinsic, in execution order.
#[derive(Debug, Clone)]
pub struct ExtrinsicReport {
    pub block_hash: H256,
    pub extrinsic_hash: H256,
    pub events: Vec<EventRecord>,
    outcome: ExtrinsicOutcome,
}

impl ExtrinsicReport {
    pub fn new(
        block_hash: H256,
        extrinsic_hash: H256,
        events: Vec<EventRecord>,
        resolver: &dyn ErrorResolver,
    ) -> Self {
        let outcome = decode_outcome(&events, resolver);
        Self {
            block_hash,
            extrinsic_hash,
            events,
            outcome,
        }
    }

    pub fn outcome(&self) -> &ExtrinsicOutcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Turn a failed dispatch into [`Error::DispatchFailed`].
    pub fn expect_success(self) -> Result<Self> {
        let error = match &self.outcome {
            ExtrinsicOutcome::Success => None,
            ExtrinsicOutcome::Failed(failure) => Some(Error::DispatchFailed(failure.clone())),
            ExtrinsicOutcome::Undefined => Some(Error::Decode(format!(
                "no ExtrinsicSuccess or ExtrinsicFailed event for {:?}",
                self.extrinsic_hash
            ))),
        };
        match error {
            None => Ok(self),
            Some(error) => Err(error),
        }
    }

    /// First event matching `filter`, in execution order.
    pub fn find(&self, filter: &EventFilter) -> Option<&EventRecord> {
        self.events.iter().find(|e| filter.matches(e))
    }

    pub fn filter<'a>(
        &'a self,
        filter: &'a EventFilter,
    ) -> impl Iterator<Item = &'a EventRecord> + 'a {
        self.events.iter().filter(move |e| filter.matches(e))
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.events.iter().any(|e| e.is(key))
    }

    /// Fold the events into a caller-defined result.
    ///
    /// ```ignore
    /// let minted = report.accumulate(0u128, |event, total| {
    ///     if event.variant == "LiquidityMinted" {
    ///         *total += event.field_at_u128(5).unwrap_or_default();
    ///     }
    /// });
    /// ```
    pub fn accumulate<T, F>(&self, initial: T, mut f: F) -> T
    where
        F: FnMut(&EventRecord, &mut T),
    {
        let mut acc = initial;
        for event in &self.events {
            f(event, &mut acc);
        }
        acc
    }

    /// Inner dispatch result of a `Sudo.sudo` or `Sudo.sudo_as` call.
    ///
    /// `None` if neither `Sudid` nor `SudoAsDone` is present.
    pub fn sudo_outcome(
        &self,
        resolver: &dyn ErrorResolver,
    ) -> Option<Result<(), DispatchFailure>> {
        self.events
            .iter()
            .filter(|e| is_sudo_result(e))
            .find_map(|e| decode_sudo_result(e, resolver))
    }

    /// Like [`Self::expect_success`], and also fail unless every `Sudo.Sudid`
    /// or `Sudo.SudoAsDone` event carries `Ok`.
    pub fn expect_sudo_success(self, resolver: &dyn ErrorResolver) -> Result<Self> {
        let report = self.expect_success()?;
        let results: Vec<_> = report
            .events
            .iter()
            .filter(|e| is_sudo_result(e))
            .filter_map(|e| decode_sudo_result(e, resolver))
            .collect();
        if results.is_empty() {
            return Err(Error::Decode(format!(
                "no Sudo.Sudid or Sudo.SudoAsDone event for {:?}",
                report.extrinsic_hash
            )));
        }
        match results.into_iter().find_map(|r| r.err()) {
            Some(failure) => Err(Error::DispatchFailed(failure)),
            None => Ok(report),
        }
    }

    /// Index and error of the failing call if a `Utility` batch stopped early.
    pub fn batch_interrupted(
        &self,
        resolver: &dyn ErrorResolver,
    ) -> Option<(u32, DispatchFailure)> {
        let event = self
            .events
            .iter()
            .find(|e| e.pallet == "Utility" && e.variant == "BatchInterrupted")?;
        let index = event
            .field("index")
            .or_else(|| event.field("0"))
            .and_then(|v| v.as_u128())
            .and_then(|i| u32::try_from(i).ok())?;
        let error = event.field("error").or_else(|| event.field("1"))?;
        Some((index, DispatchFailure::decode(error, resolver)))
    }
}

fn decode_outcome(events: &[EventRecord], resolver: &dyn ErrorResolver) -> ExtrinsicOutcome {
    for event in events.iter().filter(|e| e.pallet == "System") {
        match event.variant.as_str() {
            "ExtrinsicSuccess" => return ExtrinsicOutcome::Success,
            "ExtrinsicFailed" => {
                let failure = event
                    .field("dispatch_error")
                    .or_else(|| event.field("0"))
                    .map(|v| DispatchFailure::decode(v, resolver))
                    .unwrap_or_else(|| DispatchFailure::other("ExtrinsicFailed"));
                return ExtrinsicOutcome::Failed(failure);
            }
            _ => {}
        }
    }
    ExtrinsicOutcome::Undefined
}

fn is_sudo_result(event: &EventRecord) -> bool {
    event.pallet == "Sudo" && (event.variant == "Sudid" || event.variant == "SudoAsDone")
}

fn decode_sudo_result(
    event: &EventRecord,
    resolver: &dyn ErrorResolver,
) -> Option<Result<(), DispatchFailure>> {
    let result = event.field("sudo_result").or_else(|| event.field("0"))?;
    let ValueDef::Variant(variant) = &result.value else {
        return None;
    };
    match variant.name.as_str() {
        "Ok" => Some(Ok(())),
        "Err" => {
            let inner = match &variant.values {
                Composite::Unnamed(values) => values.first(),
                Composite::Named(values) => values.first().map(|(_, v)| v),
            }?;
            Some(Err(DispatchFailure::decode(inner, resolver)))
        }
        _ => None,
    }
}
