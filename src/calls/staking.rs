//! `ParachainStaking` collator and delegator calls.

use subxt::utils::AccountId32;

use super::{account, balance, option, token, uint, unit_variant, Balance, Call, TokenId};

const PALLET: &str = "ParachainStaking";

/// Which balance a bond is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondKind {
    AvailableBalance,
    ActivatedUnstakedReserves,
    UnspentReserves,
}

impl BondKind {
    fn name(self) -> &'static str {
        match self {
            BondKind::AvailableBalance => "AvailableBalance",
            BondKind::ActivatedUnstakedReserves => "ActivatedUnstakedReserves",
            BondKind::UnspentReserves => "UnspentReserves",
        }
    }
}

fn bond_from(kind: Option<BondKind>) -> subxt::ext::scale_value::Value {
    option(kind.map(|k| unit_variant(k.name())))
}

/// Join the candidate pool bonding `bond` of `liquidity_token`.
///
/// `candidate_count` and `liquidity_token_count` are weight hints and must be
/// at least the current pool size and staking-liquidity-token count.
pub fn join_candidates(
    bond: Balance,
    liquidity_token: TokenId,
    from: Option<BondKind>,
    candidate_count: u32,
    liquidity_token_count: u32,
) -> Call {
    Call::new(
        PALLET,
        "join_candidates",
        vec![
            balance(bond),
            token(liquidity_token),
            bond_from(from),
            uint(candidate_count),
            uint(liquidity_token_count),
        ],
    )
}

pub fn delegate(
    collator: &AccountId32,
    amount: Balance,
    from: Option<BondKind>,
    candidate_delegation_count: u32,
    delegation_count: u32,
) -> Call {
    Call::new(
        PALLET,
        "delegate",
        vec![
            account(collator),
            balance(amount),
            bond_from(from),
            uint(candidate_delegation_count),
            uint(delegation_count),
        ],
    )
}

pub fn schedule_leave_candidates(candidate_count: u32) -> Call {
    Call::new(
        PALLET,
        "schedule_leave_candidates",
        vec![uint(candidate_count)],
    )
}

pub fn go_offline() -> Call {
    Call::new(PALLET, "go_offline", vec![])
}

pub fn go_online() -> Call {
    Call::new(PALLET, "go_online", vec![])
}
