#![doc = include_str!("../README.md")]

mod error;

pub mod assembly;
pub mod bits;
pub mod calibration;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod fec;
pub mod framing;
pub mod message;
pub mod sync;

pub use error::{Error, Result};
