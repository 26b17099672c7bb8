//! Domain models for Optisynth.
//!
//! Canonical definitions for the artifacts that flow through a workflow:
//! - `Fragment`: named text produced by a collaborator for one placeholder
//! - `AssembledProgram`: immutable program text produced by the assembler
//! - `ContentDigest`: SHA-256 address used by the ledger and exports

pub mod digest;
pub mod error;
pub mod program;

pub use digest::ContentDigest;
pub use error::{OptisynthError, Result};
pub use program::{AssembledProgram, Fragment};
