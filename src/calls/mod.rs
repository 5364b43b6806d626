//! Typed builders for the extrinsics the suite submits.
//!
//! Each submodule covers one pallet and exposes plain functions taking domain
//! types and returning a [`Call`]. Nothing here touches the network. The call
//! is encoded against live metadata only when it is signed, so a field that
//! does not fit the runtime's shape fails at submission.

use subxt::{
    ext::scale_value::{Composite, Value},
    tx::DynamicPayload,
    utils::AccountId32,
};

pub mod bootstrap;
pub mod fee_lock;
pub mod proof_of_stake;
pub mod rolldown;
pub mod staking;
pub mod sudo;
pub mod tokens;
pub mod vesting;
pub mod xyk;

/// Token balance in the chain's smallest unit.
pub type Balance = u128;

/// Block number as stored by the runtime.
pub type BlockNumber = u32;

// ============================================================================
// TokenId
// ============================================================================

/// Currency identifier in the `Tokens` pallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u32);

impl TokenId {
    /// The chain's native token.
    pub const NATIVE: TokenId = TokenId(0);
}

impl From<u32> for TokenId {
    fn from(id: u32) -> Self {
        TokenId(id)
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Permill
// ============================================================================

/// Parts per million, saturating at 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Permill(u32);

impl Permill {
    pub const ONE: Permill = Permill(1_000_000);

    pub fn from_parts(parts: u32) -> Self {
        Permill(parts.min(Self::ONE.0))
    }

    pub fn from_percent(percent: u8) -> Self {
        Self::from_parts(percent as u32 * 10_000)
    }

    pub fn parts(self) -> u32 {
        self.0
    }
}

// ============================================================================
// Call
// ============================================================================

/// An unsigned runtime call ready to be signed.
#[derive(Debug, Clone)]
pub struct Call {
    payload: DynamicPayload,
}

impl Call {
    pub fn new(pallet: &str, call: &str, fields: Vec<Value>) -> Self {
        Self {
            payload: subxt::dynamic::tx(pallet, call, fields),
        }
    }

    pub fn pallet(&self) -> &str {
        self.payload.pallet_name()
    }

    pub fn name(&self) -> &str {
        self.payload.call_name()
    }

    pub fn fields(&self) -> &Composite<()> {
        self.payload.call_data()
    }

    /// Positional call argument.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.fields().values().nth(index)
    }

    pub fn payload(&self) -> &DynamicPayload {
        &self.payload
    }

    /// The call as a `RuntimeCall` value, for nesting inside sudo or batches.
    pub fn into_value(self) -> Value {
        self.payload.into_value()
    }
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.pallet(), self.name())
    }
}

// ============================================================================
// Value helpers
// ============================================================================

pub(crate) fn token(id: TokenId) -> Value {
    Value::u128(id.0 as u128)
}

pub(crate) fn balance(amount: Balance) -> Value {
    Value::u128(amount)
}

pub(crate) fn uint(n: impl Into<u128>) -> Value {
    Value::u128(n.into())
}

pub(crate) fn account(who: &AccountId32) -> Value {
    Value::from_bytes(who.0)
}

/// `MultiAddress::Id`, for arguments typed as a lookup source.
pub(crate) fn lookup(who: &AccountId32) -> Value {
    Value::unnamed_variant("Id", [account(who)])
}

pub(crate) fn option(value: Option<Value>) -> Value {
    match value {
        Some(v) => Value::unnamed_variant("Some", [v]),
        None => Value::unnamed_variant("None", Vec::new()),
    }
}

pub(crate) fn unit_variant(name: &str) -> Value {
    Value::unnamed_variant(name, Vec::new())
}
