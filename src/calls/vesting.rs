//! `Vesting` schedules.

use subxt::{ext::scale_value::Value, utils::AccountId32};

use super::{balance, lookup, token, uint, Balance, BlockNumber, Call, TokenId};

const PALLET: &str = "Vesting";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VestingSchedule {
    pub locked: Balance,
    pub per_block: Balance,
    pub starting_block: BlockNumber,
}

/// Unlock whatever has vested of `token` for the signer.
pub fn vest(token_id: TokenId) -> Call {
    Call::new(PALLET, "vest", vec![token(token_id)])
}

/// Sudo-only transfer that locks the amount under `schedule` on arrival.
pub fn force_vested_transfer(
    token_id: TokenId,
    source: &AccountId32,
    target: &AccountId32,
    schedule: VestingSchedule,
) -> Call {
    Call::new(
        PALLET,
        "force_vested_transfer",
        vec![
            token(token_id),
            lookup(source),
            lookup(target),
            Value::named_composite([
                ("locked", balance(schedule.locked)),
                ("per_block", balance(schedule.per_block)),
                ("starting_block", uint(schedule.starting_block)),
            ]),
        ],
    )
}
