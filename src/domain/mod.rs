//! Domain layer - billing rules and shared value types.

pub mod billing;
pub mod foundation;
