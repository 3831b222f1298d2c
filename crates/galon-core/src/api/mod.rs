//! REST API client module for the Galon backend.
//!
//! `ApiClient` is the authenticated request dispatcher: it attaches the
//! bearer token, recovers from expired tokens with a single coordinated
//! refresh, and classifies failures as `ApiError`. Endpoint groups in
//! `resources` wrap it for the dashboard, customer, transaction and payment
//! resources.

pub mod client;
pub mod error;
pub mod refresh;
pub mod resources;
pub mod transport;
pub mod upload;

pub use client::ApiClient;
pub use error::{ApiError, AuthFailure};
pub use refresh::RefreshCoordinator;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};
pub use upload::FormData;
