#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// channel reduction module.
pub mod color;

/// image filtering module.
pub mod filter;

/// working-image pipeline module.
pub mod pipeline;
