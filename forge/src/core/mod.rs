//! Deterministic, pure logic for the round pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod correlation;
pub mod record;
pub mod request;
pub mod verdict;
pub mod wire;
