//! Client-side navigation requested by the data layer.
//!
//! The only navigation the data layer ever asks for is a redirect to the
//! unauthenticated entry point after a forced logout.

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Route shown to users who are not logged in.
pub const ENTRY_ROUTE: &str = "/";

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Ignores navigation; for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, route: &str) {
        debug!(route, "Navigation ignored");
    }
}

/// Forwards routes to whoever drives the UI.
impl Navigator for mpsc::UnboundedSender<String> {
    fn navigate(&self, route: &str) {
        if self.send(route.to_string()).is_err() {
            warn!(route, "Navigation receiver dropped");
        }
    }
}
