//! Session lifecycle state.

use serde::{Deserialize, Serialize};

/// Phase of the debug session as far as the peripheral tree is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// No session, or a session without a description.
    #[default]
    Idle,
    /// A parse is in flight. Only a result tagged with `generation` is applied.
    Loading { generation: u64 },
    /// The collection holds the parsed peripherals.
    Ready,
    /// The last parse failed. Reads behave like `Idle`.
    Failed { message: String },
}

impl LifecycleState {
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether a parse result for `generation` is still wanted.
    pub const fn accepts(&self, generation: u64) -> bool {
        matches!(self, Self::Loading { generation: g } if *g == generation)
    }
}
