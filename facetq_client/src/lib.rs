//! Faceted query client library
//!
//! Keeps the request/result state of query views consistent while facet
//! toggles and page moves race against a slow backend.

pub mod error;
pub mod menu;
pub mod orchestrator;
pub mod resolver;
pub mod selection;
pub mod transport;
pub mod view;
