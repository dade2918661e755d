//! Unlock conditions and the context they are evaluated against.
//!
//! A condition names the address allowed to spend an output and may
//! additionally restrict spending until a block height or Unix timestamp
//! has been reached.

use serde::{Deserialize, Serialize};

use crate::address::UnlockHash;
use crate::constants::LOCKTIME_THRESHOLD;

/// Chain state a condition is tested against: current height and time.
///
/// Built fresh for every classification since both values only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FulfillableContext {
    pub block_height: u64,
    /// Unix timestamp in seconds.
    pub block_time: u64,
}

impl FulfillableContext {
    pub fn new(block_height: u64, block_time: u64) -> Self {
        Self {
            block_height,
            block_time,
        }
    }

    /// Context at `block_height` using the current wall-clock time.
    pub fn now(block_height: u64) -> Self {
        let block_time = chrono::Utc::now().timestamp().max(0) as u64;
        Self::new(block_height, block_time)
    }
}

/// Who may spend an output, and from when.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub enum UnlockCondition {
    /// Spendable by anyone.
    Nil,
    /// Spendable by the owner of the unlock hash.
    UnlockHash(UnlockHash),
    /// Wraps another condition and keeps it locked until `lock_time`.
    ///
    /// Values below [`LOCKTIME_THRESHOLD`] are block heights, all others are
    /// Unix timestamps in seconds.
    TimeLock {
        lock_time: u64,
        condition: Box<UnlockCondition>,
    },
    /// A condition type this wallet cannot evaluate, such as a multisig or
    /// atomic swap. It never pays to a wallet address and is never spendable.
    Unsupported { kind: u8 },
}

impl UnlockCondition {
    /// Time-locked wrapper around `condition`.
    pub fn time_locked(lock_time: u64, condition: UnlockCondition) -> Self {
        UnlockCondition::TimeLock {
            lock_time,
            condition: Box::new(condition),
        }
    }

    /// Address this condition pays to. Time locks are looked through.
    pub fn unlock_hash(&self) -> UnlockHash {
        match self {
            UnlockCondition::Nil | UnlockCondition::Unsupported { .. } => UnlockHash::NIL,
            UnlockCondition::UnlockHash(uh) => *uh,
            UnlockCondition::TimeLock { condition, .. } => condition.unlock_hash(),
        }
    }

    /// Whether the condition could be fulfilled right now under `ctx`.
    pub fn is_fulfillable(&self, ctx: &FulfillableContext) -> bool {
        match self {
            UnlockCondition::Nil | UnlockCondition::UnlockHash(_) => true,
            UnlockCondition::Unsupported { .. } => false,
            UnlockCondition::TimeLock {
                lock_time,
                condition,
            } => {
                let elapsed = if *lock_time < LOCKTIME_THRESHOLD {
                    ctx.block_height >= *lock_time
                } else {
                    ctx.block_time >= *lock_time
                };
                elapsed && condition.is_fulfillable(ctx)
            }
        }
    }

    /// Canonical bytes committed to by the signing hash.
    pub fn encode_for_signing(&self, out: &mut Vec<u8>) {
        match self {
            UnlockCondition::Nil => out.push(0),
            UnlockCondition::UnlockHash(uh) => {
                out.push(1);
                out.push(uh.unlock_type().as_byte());
                out.extend_from_slice(uh.hash().as_bytes());
            }
            UnlockCondition::TimeLock {
                lock_time,
                condition,
            } => {
                out.push(3);
                out.extend_from_slice(&lock_time.to_le_bytes());
                condition.encode_for_signing(out);
            }
            UnlockCondition::Unsupported { kind } => out.push(*kind),
        }
    }
}

impl From<UnlockHash> for UnlockCondition {
    fn from(uh: UnlockHash) -> Self {
        UnlockCondition::UnlockHash(uh)
    }
}
