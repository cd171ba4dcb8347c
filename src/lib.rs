//! relprov - release provisioner
//!
//! Compiles the packages of a release on a remote agent, in dependency
//! order, caching compiled artifacts so repeated runs only build what
//! changed.

pub mod agent;
pub mod blobstore;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod eventlog;
pub mod fingerprint;
pub mod instance;
pub mod release;
pub mod repo;

pub use error::{RelprovError, RelprovResult};
