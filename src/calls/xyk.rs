//! `Xyk` pool operations.

use subxt::ext::scale_value::Value;

use super::{balance, token, uint, Balance, Call, Permill, TokenId};

const PALLET: &str = "Xyk";

pub fn create_pool(
    first: TokenId,
    first_amount: Balance,
    second: TokenId,
    second_amount: Balance,
) -> Call {
    Call::new(
        PALLET,
        "create_pool",
        vec![
            token(first),
            balance(first_amount),
            token(second),
            balance(second_amount),
        ],
    )
}

/// Sell exactly `amount` of `sold`, receiving at least `min_amount_out` of `bought`.
pub fn sell_asset(
    sold: TokenId,
    bought: TokenId,
    amount: Balance,
    min_amount_out: Balance,
) -> Call {
    Call::new(
        PALLET,
        "sell_asset",
        vec![token(sold), token(bought), balance(amount), balance(min_amount_out)],
    )
}

/// Buy exactly `amount` of `bought`, paying at most `max_amount_in` of `sold`.
pub fn buy_asset(
    sold: TokenId,
    bought: TokenId,
    amount: Balance,
    max_amount_in: Balance,
) -> Call {
    Call::new(
        PALLET,
        "buy_asset",
        vec![token(sold), token(bought), balance(amount), balance(max_amount_in)],
    )
}

pub fn mint_liquidity(
    first: TokenId,
    second: TokenId,
    first_amount: Balance,
    expected_second_amount: Balance,
) -> Call {
    Call::new(
        PALLET,
        "mint_liquidity",
        vec![
            token(first),
            token(second),
            balance(first_amount),
            balance(expected_second_amount),
        ],
    )
}

pub fn burn_liquidity(first: TokenId, second: TokenId, liquidity_amount: Balance) -> Call {
    Call::new(
        PALLET,
        "burn_liquidity",
        vec![token(first), token(second), balance(liquidity_amount)],
    )
}

/// Swap along `path`, selling `amount` of its first token.
pub fn multiswap_sell_asset(path: &[TokenId], amount: Balance, min_amount_out: Balance) -> Call {
    Call::new(
        PALLET,
        "multiswap_sell_asset",
        vec![token_path(path), balance(amount), balance(min_amount_out)],
    )
}

/// Swap along `path`, buying `amount` of its last token.
pub fn multiswap_buy_asset(path: &[TokenId], amount: Balance, max_amount_in: Balance) -> Call {
    Call::new(
        PALLET,
        "multiswap_buy_asset",
        vec![token_path(path), balance(amount), balance(max_amount_in)],
    )
}

/// Claim rewards for `liquidity` and provide `share` of them back as liquidity.
pub fn compound_rewards(liquidity: TokenId, share: Permill) -> Call {
    Call::new(
        PALLET,
        "compound_rewards",
        vec![token(liquidity), uint(share.parts())],
    )
}

pub fn provide_liquidity_with_conversion(
    liquidity: TokenId,
    provided: TokenId,
    provided_amount: Balance,
) -> Call {
    Call::new(
        PALLET,
        "provide_liquidity_with_conversion",
        vec![token(liquidity), token(provided), balance(provided_amount)],
    )
}

fn token_path(path: &[TokenId]) -> Value {
    Value::unnamed_composite(path.iter().copied().map(token))
}
