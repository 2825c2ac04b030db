//! Internal implementation details.
//!
//! Storage layout for the pool. Not part of the public API.

pub(crate) mod arena;

pub(crate) use arena::{Arena, Region};
