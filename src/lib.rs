//! Netatmo sensor bridge library.
//!
//! Polls a Netatmo wind or rain gauge and exposes the result as a debounced
//! virtual smart-home accessory (momentary switch or leak sensor).

pub mod bridge;
pub mod config;
pub mod error;
pub mod input;
pub mod poller;
pub mod sensors;
pub mod service;

pub use error::{BridgeError, Result};
