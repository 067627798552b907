//! Oven value types
//!
//! Plain data exchanged between the UI layer and the protocol client.
//! Everything here is freely copyable and owns no connection state.

mod pid;
mod recipe;
mod sample;
mod status;

pub use pid::{ParsePidError, Pid};
pub use recipe::{Recipe, RecipeChange, RecipeError, RecipeStep, MAX_STEPS, MAX_RAW_TIME, MIN_STEPS};
pub use sample::{Sample, MAX_POWER, PWM_STEPS};
pub use status::Status;
