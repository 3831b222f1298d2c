//! Reactive state containers that mirror server data for the UI.
//!
//! Each store publishes its state through a `tokio::sync::watch` channel so
//! any number of views can observe changes.

pub mod customers;

pub use customers::{CustomerState, CustomerStore};
