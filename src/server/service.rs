use std::sync::Arc;

use super::request::IncomingRequest;
use super::transport::Wire;
use crate::dispatcher::{Completion, Dispatcher};

/// Default cap on request bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default cap on a request head (request line plus headers).
pub const DEFAULT_MAX_HEAD_BYTES: usize = 64 * 1024;

/// Size limits enforced by the socket binding before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimits {
    pub max_body_bytes: usize,
    pub max_head_bytes: usize,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
        }
    }
}

/// What the socket binding calls for every parsed request.
#[derive(Clone)]
pub struct AppService {
    dispatcher: Arc<Dispatcher>,
    limits: ServiceLimits,
}

impl AppService {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            limits: ServiceLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ServiceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> ServiceLimits {
        self.limits
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn call(&self, request: IncomingRequest, wire: &mut Wire<'_>) -> Completion {
        self.dispatcher.handle(request, wire).await
    }
}
