//! `Bootstrap` pool launches.

use subxt::ext::scale_value::Value;

use super::{balance, option, token, uint, Balance, BlockNumber, Call, TokenId};

const PALLET: &str = "Bootstrap";

/// Parameters of a scheduled bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapSchedule {
    pub first: TokenId,
    pub second: TokenId,
    pub ido_start: BlockNumber,
    pub whitelist_phase_length: Option<u32>,
    pub public_phase_length: u32,
    /// Maximum `first:second` provision ratio
    pub max_first_to_second_ratio: Option<(Balance, Balance)>,
    pub promote_bootstrap_pool: bool,
}

/// Sudo-only.
pub fn schedule_bootstrap(schedule: BootstrapSchedule) -> Call {
    let ratio = schedule
        .max_first_to_second_ratio
        .map(|(num, den)| Value::unnamed_composite([balance(num), balance(den)]));
    Call::new(
        PALLET,
        "schedule_bootstrap",
        vec![
            token(schedule.first),
            token(schedule.second),
            uint(schedule.ido_start),
            option(schedule.whitelist_phase_length.map(uint)),
            uint(schedule.public_phase_length),
            option(ratio),
            Value::bool(schedule.promote_bootstrap_pool),
        ],
    )
}

pub fn provision(token_id: TokenId, amount: Balance) -> Call {
    Call::new(PALLET, "provision", vec![token(token_id), balance(amount)])
}

pub fn claim_liquidity_tokens() -> Call {
    Call::new(PALLET, "claim_liquidity_tokens", vec![])
}

/// Sudo-only; clears bootstrap storage once every provider has claimed.
pub fn finalize() -> Call {
    Call::new(PALLET, "finalize", vec![])
}

/// Sudo-only; only valid before the bootstrap starts.
pub fn cancel_bootstrap() -> Call {
    Call::new(PALLET, "cancel_bootstrap", vec![])
}

/// Sudo-only.
pub fn update_promote_bootstrap_pool(promote: bool) -> Call {
    Call::new(
        PALLET,
        "update_promote_bootstrap_pool",
        vec![Value::bool(promote)],
    )
}
