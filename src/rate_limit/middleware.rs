use crate::error::GuardError;
use crate::registry::PluginLimiters;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that gates every request behind one plugin's limiter.
#[derive(Clone, Debug)]
pub struct PluginLimitLayer {
    limiters: Arc<PluginLimiters>,
    plugin: Arc<str>,
}

impl PluginLimitLayer {
    pub fn new(limiters: Arc<PluginLimiters>, plugin: impl Into<Arc<str>>) -> Self {
        Self { limiters, plugin: plugin.into() }
    }
}

impl<S> Layer<S> for PluginLimitLayer {
    type Service = PluginLimitService<S>;

    fn layer(&self, service: S) -> Self::Service {
        PluginLimitService {
            inner: service,
            limiters: self.limiters.clone(),
            plugin: self.plugin.clone(),
        }
    }
}

/// Middleware service produced by [`PluginLimitLayer`].
///
/// The blocking acquire runs on tokio's blocking pool so a minute-limited plugin
/// never stalls the async workers. Requires a tokio runtime.
#[derive(Clone, Debug)]
pub struct PluginLimitService<S> {
    inner: S,
    limiters: Arc<PluginLimiters>,
    plugin: Arc<str>,
}

impl<S, Req> Service<Req> for PluginLimitService<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = GuardError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(GuardError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiters = self.limiters.clone();
        let plugin = self.plugin.clone();
        // Take the service that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match tokio::task::spawn_blocking(move || limiters.acquire(&plugin)).await {
                Ok(Ok(())) => inner.call(req).await.map_err(GuardError::Inner),
                Ok(Err(limit)) => Err(GuardError::Limit(limit)),
                // The blocking task panicked or the runtime is shutting down.
                Err(e) => Err(GuardError::Infrastructure(e.to_string())),
            }
        })
    }
}
