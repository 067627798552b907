//! # OvenHMI Core Library
//!
//! Communication core for the reflow oven touchscreen controller.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Discovery and lifecycle of the USB serial link to the oven controller
//! - The controller's binary protocol (fixed-point recipes, PID floats, samples)
//! - A client that serializes concurrent requests over the half-duplex link
//! - A simulated controller for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use ovenhmi_core::prelude::*;
//! use std::time::Duration;
//!
//! let oven = OvenClient::new(LinkConfig::default());
//!
//! let recipe = Recipe::from_steps(vec![
//!     RecipeStep::new(Duration::ZERO, 25.0),
//!     RecipeStep::new(Duration::from_secs(30 * 60), 225.0),
//! ]);
//! if oven.set_recipe(&recipe).await {
//!     println!("status: {}", oven.start().await);
//! } else {
//!     eprintln!("upload failed: {:?}", oven.last_error());
//! }
//! ```

pub mod demo;
pub mod model;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::demo::{DemoPortProvider, SimulatedOven};
    pub use crate::model::{Pid, Recipe, RecipeStep, Sample, Status};
    pub use crate::protocol::{ConnectionState, LinkConfig, OvenClient, OvenError};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
