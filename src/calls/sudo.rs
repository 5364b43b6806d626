//! `Sudo` and `Utility` wrappers.

use subxt::{ext::scale_value::Value, utils::AccountId32};

use super::{lookup, Call};

/// Dispatch `call` with root origin.
pub fn sudo(call: Call) -> Call {
    Call::new("Sudo", "sudo", vec![call.into_value()])
}

/// Dispatch `call` signed as `who`.
pub fn sudo_as(who: &AccountId32, call: Call) -> Call {
    Call::new("Sudo", "sudo_as", vec![lookup(who), call.into_value()])
}

/// All-or-nothing batch; reverts every call if one fails.
pub fn batch_all(calls: impl IntoIterator<Item = Call>) -> Call {
    Call::new("Utility", "batch_all", vec![call_list(calls)])
}

/// Best-effort batch; stops at the first failure and emits `BatchInterrupted`.
pub fn batch(calls: impl IntoIterator<Item = Call>) -> Call {
    Call::new("Utility", "batch", vec![call_list(calls)])
}

/// `batch_all` of each call wrapped in `sudo`, to be signed by the sudo key.
pub fn sudo_batch(calls: impl IntoIterator<Item = Call>) -> Call {
    batch_all(calls.into_iter().map(sudo))
}

fn call_list(calls: impl IntoIterator<Item = Call>) -> Value {
    Value::unnamed_composite(calls.into_iter().map(Call::into_value))
}
