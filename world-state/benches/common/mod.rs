//! Shared configuration and macros of the world state benchmarks.
//!
//! Benchmark functions are named `<component>_<operation>`, e.g. `forest_sequential_insert` or
//! `state_handle_block`.

#![allow(dead_code)] // benchmark use doesn't count as "usage" for linting

pub mod config;
pub mod macros;
