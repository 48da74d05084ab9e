#![forbid(unsafe_code)]

//! Core types shared across the Sigtuna XML Encryption workspace.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
