//! Integration test crate for Revue.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on the timeline and colour crates to verify they work
//! together.

#[cfg(test)]
mod timeline;

#[cfg(test)]
mod colour;
