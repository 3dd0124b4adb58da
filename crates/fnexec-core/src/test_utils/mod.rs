//! Test doubles shared by the crate's unit tests.

pub mod fake_runtime;
