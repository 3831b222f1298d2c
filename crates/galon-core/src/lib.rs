//! Client data layer for the Galon water-gallon delivery tracker.
//!
//! The crate talks to the Galon REST backend on behalf of a UI:
//!
//! - [`api::ApiClient`] sends authenticated requests and transparently
//!   recovers from expired access tokens with a single coordinated refresh
//! - [`auth::AuthStore`] holds the session (login, refresh, logout)
//! - [`stores::CustomerStore`] mirrors customer data as reactive state
//! - [`models`] validates and formats customer records
//!
//! ```no_run
//! use std::sync::Arc;
//! use galon_core::{api::{ApiClient, HttpTransport}, auth::{AuthStore, Session}, Config};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let transport = Arc::new(HttpTransport::new(&config)?);
//! let auth = Arc::new(AuthStore::new(transport.clone(), Session::new(config.session_dir()?)));
//! auth.restore();
//!
//! let api = ApiClient::new(transport, auth.clone());
//! let customers = api.customers().get_all().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod navigation;
pub mod stores;
pub mod utils;

pub use config::Config;
