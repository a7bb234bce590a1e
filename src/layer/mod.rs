//! Layer materialization and dependency wiring.
//!
//! A layer definition element becomes a [`LayerObject`] through the
//! resolution procedure in [`materialize`]: dependencies (joins,
//! expression references, value relations) are pulled in first, the
//! shared cache is consulted, and only a cache miss materializes a fresh
//! object under that key's in-flight slot. Embedded references delegate
//! to their source project document.

mod materialize;
mod registry;
mod types;

pub use materialize::ResolverServices;
pub(crate) use materialize::{resolve_by_id, resolve_definition, ResolveCtx};
pub use registry::LayerRegistry;
pub use types::{LayerField, LayerJoin, LayerKind, LayerObject};
