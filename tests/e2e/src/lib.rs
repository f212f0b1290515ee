//! End-to-end test support for the Hearth core.
//!
//! `harness` builds throwaway engines and stores on temp directories;
//! `mocks` generates event-stream fixtures shaped like real households.

pub mod harness;
pub mod mocks;
