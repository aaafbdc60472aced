#![doc = include_str!("../README.md")]

mod error;
mod filter;
mod request;
mod stats;
mod store;

pub use crate::error::*;
pub use crate::filter::*;
pub use crate::request::*;
pub use crate::stats::*;
pub use crate::store::*;
