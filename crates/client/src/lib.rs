//! Deliverly client library.
//!
//! Order assembly and payment settlement for the Deliverly storefront and
//! courier apps:
//!
//! - [`cart`] - In-memory cart store shared between screens
//! - [`promotions`] - Promo code evaluation and the cached catalog
//! - [`pricing`] - Order totals and the courier price floor
//! - [`checkout`] - Order submission state machine
//! - [`settlement`] - Gateway payment polling and finalization
//! - [`api`] - Typed client for the backend REST API
//! - [`config`] - Environment-driven configuration

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod pricing;
pub mod promotions;
pub mod settlement;

pub use cart::{Cart, CartLineItem, CartProduct, SharedCart};
pub use checkout::{Checkout, CheckoutSettings, CheckoutState, OrderRequest, SubmitOutcome};
pub use config::ClientConfig;
pub use error::{CheckoutError, ValidationError};
