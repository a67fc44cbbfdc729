//! Input sources.
//!
//! Only the Netatmo Weather cloud API is supported.

pub mod netatmo;
