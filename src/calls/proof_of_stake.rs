//! `ProofOfStake` liquidity mining.

use super::{balance, option, token, uint, unit_variant, Balance, Call, TokenId};

const PALLET: &str = "ProofOfStake";

/// Which balance liquidity is activated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateKind {
    AvailableBalance,
    StakedUnactivatedReserves,
    UnspentReserves,
}

impl ActivateKind {
    fn name(self) -> &'static str {
        match self {
            ActivateKind::AvailableBalance => "AvailableBalance",
            ActivateKind::StakedUnactivatedReserves => "StakedUnactivatedReserves",
            ActivateKind::UnspentReserves => "UnspentReserves",
        }
    }
}

/// Promote a pool for native rewards with the given issuance weight.
/// A weight of zero removes the promotion.
pub fn update_pool_promotion(liquidity: TokenId, weight: u8) -> Call {
    Call::new(
        PALLET,
        "update_pool_promotion",
        vec![token(liquidity), uint(weight)],
    )
}

pub fn activate_liquidity(
    liquidity: TokenId,
    amount: Balance,
    use_balance_from: Option<ActivateKind>,
) -> Call {
    Call::new(
        PALLET,
        "activate_liquidity",
        vec![
            token(liquidity),
            balance(amount),
            option(use_balance_from.map(|k| unit_variant(k.name()))),
        ],
    )
}

pub fn deactivate_liquidity(liquidity: TokenId, amount: Balance) -> Call {
    Call::new(
        PALLET,
        "deactivate_liquidity",
        vec![token(liquidity), balance(amount)],
    )
}

pub fn claim_native_rewards(liquidity: TokenId) -> Call {
    Call::new(PALLET, "claim_native_rewards", vec![token(liquidity)])
}
