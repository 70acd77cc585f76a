//! Benchmarks and other diagnostics.

pub mod bench;
