//! Data models for Galon entities.
//!
//! - `Customer`, `CustomerDraft`, `CustomerPayload`: the customer record, its
//!   form state, and the cleaned request body
//! - `Envelope`: responses that may or may not wrap their payload in `data`

pub mod customer;
pub mod envelope;

pub use customer::{Customer, CustomerDraft, CustomerPayload, FormattedCustomer, ValidationErrors};
pub use envelope::Envelope;
