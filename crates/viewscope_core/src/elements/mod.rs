//! Ready-made node types for hosts and tests.

mod block;

pub use block::*;
