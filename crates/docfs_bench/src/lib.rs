//! Shared helpers for the DocFS benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
