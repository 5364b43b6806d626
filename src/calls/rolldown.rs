//! `Rolldown` L1 bridge requests.

use subxt::ext::scale_value::Value;

use super::{balance, option, unit_variant, Balance, Call};

const PALLET: &str = "Rolldown";

/// L1 chains the bridge settles to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum L1Chain {
    Ethereum,
    Arbitrum,
    Base,
}

impl L1Chain {
    pub fn name(self) -> &'static str {
        match self {
            L1Chain::Ethereum => "Ethereum",
            L1Chain::Arbitrum => "Arbitrum",
            L1Chain::Base => "Base",
        }
    }

    fn value(self) -> Value {
        unit_variant(self.name())
    }
}

/// 20-byte L1 address.
pub type L1Address = [u8; 20];

/// Withdraw `amount` of the token bridged from `token_address` to `recipient`
/// on `chain`, optionally tipping a ferry.
pub fn withdraw(
    chain: L1Chain,
    recipient: L1Address,
    token_address: L1Address,
    amount: Balance,
    ferry_tip: Option<Balance>,
) -> Call {
    Call::new(
        PALLET,
        "withdraw",
        vec![
            chain.value(),
            Value::from_bytes(recipient),
            Value::from_bytes(token_address),
            balance(amount),
            option(ferry_tip.map(balance)),
        ],
    )
}

/// Sequencer-only; dispute the L1 update at `request_block`.
pub fn cancel_requests_from_l1(chain: L1Chain, request_block: u128) -> Call {
    Call::new(
        PALLET,
        "cancel_requests_from_l1",
        vec![chain.value(), Value::u128(request_block)],
    )
}

/// Sudo-only.
pub fn force_cancel_requests_from_l1(chain: L1Chain, request_block: u128) -> Call {
    Call::new(
        PALLET,
        "force_cancel_requests_from_l1",
        vec![chain.value(), Value::u128(request_block)],
    )
}

pub fn refund_failed_deposit(chain: L1Chain, request_id: u128) -> Call {
    Call::new(
        PALLET,
        "refund_failed_deposit",
        vec![chain.value(), Value::u128(request_id)],
    )
}
