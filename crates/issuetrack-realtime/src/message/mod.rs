//! Inbound push frames.

pub mod frame;
pub mod legacy;

pub use frame::{Dispatch, Frame};
