//! Request filter chain
//!
//! An ordered list of stages run before the router. Each stage either
//! hands the request on or answers it directly.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

/// Result of running a stage
pub enum StageOutcome {
    /// Hand the (possibly annotated) request to the next stage
    Continue(Request),
    /// Stop here and answer with this response
    Respond(Response),
}

/// One step of the filter chain
#[async_trait]
pub trait RequestStage: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn process(&self, request: Request) -> StageOutcome;
}

/// Ordered stages applied to every request
#[derive(Clone, Default)]
pub struct FilterChain {
    stages: Vec<Arc<dyn RequestStage>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn with_stage(mut self, stage: impl RequestStage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the stages in order until one responds
    pub async fn run(&self, mut request: Request) -> StageOutcome {
        for stage in &self.stages {
            match stage.process(request).await {
                StageOutcome::Continue(next) => request = next,
                StageOutcome::Respond(response) => {
                    debug!(
                        "Stage {} answered with {}",
                        stage.name(),
                        response.status()
                    );
                    return StageOutcome::Respond(response);
                }
            }
        }
        StageOutcome::Continue(request)
    }
}

/// Axum middleware running the filter chain before the router
pub async fn filter_chain_middleware(
    State(chain): State<FilterChain>,
    request: Request,
    next: Next,
) -> Response {
    match chain.run(request).await {
        StageOutcome::Continue(request) => next.run(request).await,
        StageOutcome::Respond(response) => response,
    }
}
