//! `FeeLock` configuration and unlocking.

use subxt::ext::scale_value::Value;

use super::{balance, option, token, uint, Balance, BlockNumber, Call, TokenId};

const PALLET: &str = "FeeLock";

/// Fee-lock parameters. `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeLockMetadata {
    pub period_length: Option<BlockNumber>,
    pub fee_lock_amount: Option<Balance>,
    pub swap_value_threshold: Option<Balance>,
    /// Tokens to add to (`true`) or remove from (`false`) the whitelist
    pub whitelist_updates: Option<Vec<(TokenId, bool)>>,
}

impl FeeLockMetadata {
    pub fn with_period_length(mut self, blocks: BlockNumber) -> Self {
        self.period_length = Some(blocks);
        self
    }

    pub fn with_fee_lock_amount(mut self, amount: Balance) -> Self {
        self.fee_lock_amount = Some(amount);
        self
    }

    pub fn with_swap_value_threshold(mut self, threshold: Balance) -> Self {
        self.swap_value_threshold = Some(threshold);
        self
    }

    pub fn whitelist(mut self, token: TokenId, whitelisted: bool) -> Self {
        self.whitelist_updates
            .get_or_insert_with(Vec::new)
            .push((token, whitelisted));
        self
    }
}

/// Sudo-only.
pub fn update_fee_lock_metadata(metadata: FeeLockMetadata) -> Call {
    let whitelist = metadata.whitelist_updates.map(|updates| {
        Value::unnamed_composite(
            updates
                .into_iter()
                .map(|(id, add)| Value::unnamed_composite([token(id), Value::bool(add)])),
        )
    });
    Call::new(
        PALLET,
        "update_fee_lock_metadata",
        vec![
            option(metadata.period_length.map(uint)),
            option(metadata.fee_lock_amount.map(balance)),
            option(metadata.swap_value_threshold.map(balance)),
            option(whitelist),
        ],
    )
}

pub fn unlock_fee() -> Call {
    Call::new(PALLET, "unlock_fee", vec![])
}
