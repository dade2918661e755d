//! Partition of owned outputs into spendable-now and still time-locked.

use tft_core::condition::FulfillableContext;
use tft_core::types::SpendableOutputs;

/// Split `outputs` into `(unlocked, locked)` under `ctx`.
///
/// Every output lands in exactly one of the two sets.
pub fn classify(
    outputs: &SpendableOutputs,
    ctx: &FulfillableContext,
) -> (SpendableOutputs, SpendableOutputs) {
    outputs
        .iter()
        .map(|(id, out)| (*id, out.clone()))
        .partition(|(_, out)| out.condition.is_fulfillable(ctx))
}
