//! Integration test suite for Purse.
//!
//! The library half holds in-memory stand-ins for the coin provider, the
//! blind signature scheme and the recovery providers; the `tests/`
//! directory drives the wallet and recovery crates against them.

pub mod helpers;
