//! Runtime for executing call turns
//!
//! The turn controller reads a call's state from the session store, runs the
//! pure transition function and executes the resulting effects.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{CallSettings, TurnController};
pub use traits::*;
