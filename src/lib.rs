#![doc = "fnpack: packaging and upload core for function deployments."]

//! This crate turns a project tree into deployable zip artifacts and ships
//! them to an object store, deciding per deployable unit whether it gets its
//! own archive or shares the service-wide one.
//!
//! # Pipeline
//! - [`rules`]: ordered include / exclude globs, last match wins
//! - [`prune`]: production-only dependency pruning (best-effort)
//! - [`select`]: deterministic file selection with POSIX modes
//! - [`archive`]: permission-preserving zip writer
//! - [`plan`]: which artifacts must exist remotely
//! - [`upload`]: bounded concurrent uploads, descriptors first
//! - [`deploy`]: the above wired together for one service
//!
//! Transport, naming and dependency enumeration are traits
//! ([`store::ObjectStore`], [`naming::ArtifactNaming`],
//! [`prune::DependencyEnumerator`]) so callers and tests can plug in their own.

pub mod archive;
pub mod config;
pub mod deploy;
pub mod error;
pub mod naming;
pub mod package;
pub mod plan;
pub mod prune;
pub mod rules;
pub mod select;
pub mod store;
pub mod upload;

pub use error::{DeployError, PackageError, PlanError, UploadError};
