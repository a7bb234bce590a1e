//! MapProject - Layer resolution engine for map-service project documents
//!
//! This library parses hierarchical XML project documents and resolves
//! them into queryable layer models for map services: materialized layer
//! objects, aggregated extents and CRS sets, legend structure, and
//! publishing restrictions, with shared caches for concurrent request
//! workers.
//!
//! # High-Level API
//!
//! For most use cases, the [`resolver`] module provides a per-request facade:
//!
//! ```ignore
//! use std::path::Path;
//! use std::sync::Arc;
//! use mapproject::layer::ResolverServices;
//! use mapproject::resolver::ProjectResolver;
//!
//! let services = Arc::new(ResolverServices::new());
//! let resolver = ProjectResolver::open(Path::new("/srv/projects/atlas.qgs"), services)
//!     .ok_or("project not loadable")?;
//!
//! let layers = resolver.resolve_all_layers();
//! let restricted = resolver.restricted_layers();
//! ```

pub mod cache;
pub mod crs;
pub mod dom;
pub mod layer;
pub mod legend;
pub mod locator;
pub mod logging;
pub mod project;
pub mod resolver;
pub mod service;

pub use cache::{DocumentCache, LayerCache};
pub use crs::{CoordTransform, CrsRef, Rect, ServiceVersion};
pub use layer::{LayerKind, LayerObject, ResolverServices};
pub use project::{ProjectDocument, ProjectError};
pub use resolver::ProjectResolver;

/// Version of the MapProject library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
