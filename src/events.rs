//! Decoded chain events and the predicates used to pick them out.
//!
//! An [`EventRecord`] is an owned, context-free copy of one runtime event:
//! pallet, variant, the phase it was emitted in and its decoded fields. Tests
//! and the poller compare records through an [`EventFilter`], which starts
//! from a `"section.Method"` key and can narrow further on the event data.

use std::{fmt, str::FromStr, sync::Arc};

use subxt::{
    events::{EventDetails, Phase},
    ext::scale_value::{At, Composite, Primitive, Value, ValueDef},
    utils::AccountId32,
    Config,
};

use crate::error::{Error, Result};

// ============================================================================
// EventPhase
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Initialization,
    /// Emitted while applying the extrinsic at this index in the block
    ApplyExtrinsic(u32),
    Finalization,
}

impl From<Phase> for EventPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Initialization => EventPhase::Initialization,
            Phase::ApplyExtrinsic(index) => EventPhase::ApplyExtrinsic(index),
            Phase::Finalization => EventPhase::Finalization,
        }
    }
}

// ============================================================================
// EventRecord
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub pallet: String,
    pub variant: String,
    pub phase: EventPhase,
    pub fields: Composite<()>,
}

impl EventRecord {
    pub fn new(
        pallet: impl Into<String>,
        variant: impl Into<String>,
        phase: EventPhase,
        fields: Composite<()>,
    ) -> Self {
        Self {
            pallet: pallet.into(),
            variant: variant.into(),
            phase,
            fields,
        }
    }

    /// Decode an event delivered by subxt.
    pub fn from_details<T: Config>(details: &EventDetails<T>) -> Result<Self> {
        let fields = details
            .field_values()
            .map_err(|e| {
                Error::Decode(format!(
                    "{}.{}: {e}",
                    details.pallet_name(),
                    details.variant_name()
                ))
            })?
            .map_context(|_| ());
        Ok(Self {
            pallet: details.pallet_name().to_string(),
            variant: details.variant_name().to_string(),
            phase: details.phase().into(),
            fields,
        })
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            section: self.pallet.clone(),
            method: self.variant.clone(),
        }
    }

    pub fn is(&self, key: &EventKey) -> bool {
        key.matches(&self.pallet, &self.variant)
    }

    /// Field by name for named events, or by position (`"0"`, `"1"`, ...) for
    /// tuple-style events.
    pub fn field(&self, name: &str) -> Option<&Value<()>> {
        match &self.fields {
            Composite::Named(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            Composite::Unnamed(values) => name.parse::<usize>().ok().and_then(|i| values.get(i)),
        }
    }

    /// Field values in declaration order.
    pub fn values(&self) -> Vec<&Value<()>> {
        self.fields.values().collect()
    }

    pub fn field_u128(&self, name: &str) -> Option<u128> {
        self.field(name).and_then(|v| v.as_u128())
    }

    pub fn field_at_u128(&self, index: usize) -> Option<u128> {
        self.values().get(index).and_then(|v| v.as_u128())
    }

    /// The event data as text.
    pub fn render(&self) -> String {
        self.fields.to_string()
    }

    /// Substring match over the rendered event data.
    pub fn contains_text(&self, needle: &str) -> bool {
        needle.is_empty() || self.render().contains(needle)
    }

    /// Whether any field, at any depth, carries this account's raw bytes.
    pub fn mentions_account(&self, account: &AccountId32) -> bool {
        self.contains_bytes(&account.0)
    }

    pub fn contains_bytes(&self, needle: &[u8]) -> bool {
        self.fields.values().any(|v| value_contains_bytes(v, needle))
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.pallet, self.variant, self.fields)
    }
}

/// Byte arrays decode as composites of `u8` primitives; search those for the
/// needle, recursing through every other composite and variant.
fn value_contains_bytes(value: &Value<()>, needle: &[u8]) -> bool {
    match &value.value {
        ValueDef::Composite(composite) => {
            if let Some(bytes) = composite_bytes(composite) {
                if bytes.windows(needle.len().max(1)).any(|w| w == needle) {
                    return true;
                }
            }
            composite.values().any(|v| value_contains_bytes(v, needle))
        }
        ValueDef::Variant(variant) => variant
            .values
            .values()
            .any(|v| value_contains_bytes(v, needle)),
        _ => false,
    }
}

fn composite_bytes(composite: &Composite<()>) -> Option<Vec<u8>> {
    let mut bytes = Vec::new();
    for value in composite.values() {
        match &value.value {
            ValueDef::Primitive(Primitive::U128(b)) if *b <= u8::MAX as u128 => {
                bytes.push(*b as u8)
            }
            _ => return None,
        }
    }
    (!bytes.is_empty()).then_some(bytes)
}

/// Read a named field out of a nested value.
pub(crate) fn value_at<'a>(value: &'a Value<()>, field: &str) -> Option<&'a Value<()>> {
    value.at(field)
}

// ============================================================================
// EventKey
// ============================================================================

/// `section.Method` event signature.
///
/// The section is compared case-insensitively, so the camel-case names the
/// JS tooling prints (`xyk.PoolCreated`) match the metadata pallet names
/// (`Xyk.PoolCreated`). The method is compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub section: String,
    pub method: String,
}

impl EventKey {
    pub fn new(section: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            method: method.into(),
        }
    }

    pub fn matches(&self, pallet: &str, variant: &str) -> bool {
        self.section.eq_ignore_ascii_case(pallet) && self.method == variant
    }
}

impl FromStr for EventKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((section, method)) if !section.is_empty() && !method.is_empty() => {
                Ok(Self::new(section, method))
            }
            _ => Err(Error::Config(format!(
                "event key '{s}' must look like 'section.Method'"
            ))),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.method)
    }
}

// ============================================================================
// EventFilter
// ============================================================================

type EventPredicate = Arc<dyn Fn(&EventRecord) -> bool + Send + Sync>;

/// Target event signature plus optional data predicates.
///
/// ```ignore
/// let filter = EventFilter::new(EventKey::new("Xyk", "PoolCreated"))
///     .involving(&user.account_id())
///     .with_data("1_000");
/// ```
#[derive(Clone)]
pub struct EventFilter {
    key: EventKey,
    data: Option<String>,
    account: Option<AccountId32>,
    predicate: Option<EventPredicate>,
}

impl EventFilter {
    pub fn new(key: EventKey) -> Self {
        Self {
            key,
            data: None,
            account: None,
            predicate: None,
        }
    }

    /// Filter from a `"section.Method"` string.
    pub fn parse(key: &str) -> Result<Self> {
        Ok(Self::new(key.parse()?))
    }

    /// Require the rendered event data to contain `needle`.
    pub fn with_data(mut self, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        self.data = (!needle.is_empty()).then_some(needle);
        self
    }

    /// Require the event to reference `account` somewhere in its fields.
    pub fn involving(mut self, account: &AccountId32) -> Self {
        self.account = Some(account.clone());
        self
    }

    pub fn matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&EventRecord) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn key(&self) -> &EventKey {
        &self.key
    }

    pub fn matches(&self, event: &EventRecord) -> bool {
        if !event.is(&self.key) {
            return false;
        }
        if let Some(needle) = &self.data {
            if !event.contains_text(needle) {
                return false;
            }
        }
        if let Some(account) = &self.account {
            if !event.mentions_account(account) {
                return false;
            }
        }
        self.predicate.as_ref().map_or(true, |p| p(event))
    }
}

impl From<EventKey> for EventFilter {
    fn from(key: EventKey) -> Self {
        Self::new(key)
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilter")
            .field("key", &self.key)
            .field("data", &self.data)
            .field("account", &self.account)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}
