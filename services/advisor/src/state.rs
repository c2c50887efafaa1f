//! Application state shared across request handlers.

use std::sync::Arc;

use crate::advisor::Advisor;
use crate::approval::{ApprovalGate, Approver};

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    advisor: Arc<Advisor>,
    follow_up: Arc<dyn Approver>,
    maps_api_key: Option<String>,
}

impl AppState {
    /// `follow_up` waits on proposals opened by passes triggered over HTTP.
    pub fn new(
        advisor: Arc<Advisor>,
        follow_up: Arc<dyn Approver>,
        maps_api_key: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                advisor,
                follow_up,
                maps_api_key,
            }),
        }
    }

    pub fn advisor(&self) -> &Arc<Advisor> {
        &self.inner.advisor
    }

    pub fn gate(&self) -> &ApprovalGate {
        self.inner.advisor.gate()
    }

    pub fn follow_up(&self) -> &Arc<dyn Approver> {
        &self.inner.follow_up
    }

    /// Browser map key, exposed to the dashboard as-is.
    pub fn maps_api_key(&self) -> Option<&str> {
        self.inner.maps_api_key.as_deref()
    }
}
