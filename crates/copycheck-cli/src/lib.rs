//! `copycheck` crate (library surface).
//!
//! The primary entrypoint for end users is the `copycheck` binary. This module re-exports the
//! pipeline crates so they can be embedded without depending on internal crate layout.

pub use copycheck_core as core;
pub use copycheck_local as local;
