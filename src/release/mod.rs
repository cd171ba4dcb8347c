//! Release model
//!
//! A release is a named, versioned set of packages. Source packages are the
//! nodes of a petgraph `DiGraph` owned by the [`Release`]; a [`PackageId`]
//! wraps the node index, so the graph needs no shared ownership.
//! Precompiled packages are kept separately and carry no edges.

pub mod manifest;
mod package;
mod resolve;

pub use manifest::ReleaseManifest;
pub use package::{Package, PackageId, PackageSpec, Release, ReleaseBuilder};
