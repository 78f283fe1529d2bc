//! Common elements for the facetq client library and tools

pub mod common;
pub mod query;
pub mod recording;
pub mod result;
pub mod selection;
