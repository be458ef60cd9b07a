//! End-to-end tests at the registry API level.
//!
//! Each test file covers a specific scenario, using fixed clocks so that
//! signed tokens and validation outcomes are deterministic.

#![cfg(test)]

mod helpers;

mod test_concurrency;
mod test_global;
mod test_lifecycle;
mod test_sign;
mod test_validate;
