//! `Tokens` transfers and sudo issuance.

use subxt::utils::AccountId32;

use super::{account, balance, lookup, token, Balance, Call, TokenId};

const PALLET: &str = "Tokens";

pub fn transfer(to: &AccountId32, token_id: TokenId, amount: Balance) -> Call {
    Call::new(
        PALLET,
        "transfer",
        vec![lookup(to), token(token_id), balance(amount)],
    )
}

/// Sudo-only; mint more of an existing token.
pub fn mint(token_id: TokenId, to: &AccountId32, amount: Balance) -> Call {
    Call::new(
        PALLET,
        "mint",
        vec![token(token_id), account(to), balance(amount)],
    )
}

/// Sudo-only; register a new token with `amount` issued to `to`.
pub fn create(to: &AccountId32, amount: Balance) -> Call {
    Call::new(PALLET, "create", vec![account(to), balance(amount)])
}
