//! Harness comprehensive tests
//!
//! End-to-end runs of the randomized writer over the filesystem directory,
//! through the `strata_testkit` facade.

#[path = "../common/mod.rs"]
mod common;

mod config_files;
mod durability;
