use crate::types::{ModelId, RequestId, Route};
use std::sync::Mutex;

/// Request-scoped metadata threaded explicitly through the coordinator,
/// rather than stashed in task-local storage. Middleware reads the final
/// values back out for metrics and the audit/log envelope once the
/// request completes.
pub struct RequestCtx {
    pub request_id: RequestId,
    pub route: Route,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    model_id: Option<ModelId>,
    cached: bool,
}

impl RequestCtx {
    pub fn new(route: Route) -> Self {
        Self { request_id: RequestId::default(), route, inner: Mutex::new(Inner::default()) }
    }

    pub fn set_model(&self, model_id: ModelId) {
        self.inner.lock().unwrap().model_id = Some(model_id);
    }

    pub fn model_id(&self) -> Option<ModelId> {
        self.inner.lock().unwrap().model_id.clone()
    }

    pub fn set_cached(&self, cached: bool) {
        self.inner.lock().unwrap().cached = cached;
    }

    pub fn cached(&self) -> bool {
        self.inner.lock().unwrap().cached
    }
}
