//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: what the request dispatcher needs from session state
//! - `AuthStore`: login, token refresh, logout, and the reactive `AuthState`
//! - `Session`: the locally persisted access token and user
//! - `Claims`: access token payload inspection

pub mod session;
pub mod store;
pub mod token;

pub use session::{Session, SessionData};
pub use store::{AuthState, AuthStore, LoginError, SessionStore};
pub use token::{Claims, User};
