//! Deliverly Core - Shared types library.
//!
//! This crate provides common types used across all Deliverly components:
//! - `client` - Cart, promotions, checkout workflow and payment settlement
//! - `cli` - Command-line driver for the checkout workflow
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, statuses and
//!   payment methods

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
