//! Lite-mode implementations of `walletsweep-core` interfaces.
//!
//! This module provides a local-filesystem object store for development, single-host runs and
//! tests.

pub mod fs;
