//! Pipeline composition: folds decorators into a single service stack.

use std::sync::Arc;

use tower::{Layer, ServiceExt};

use super::layer::{DecoratorLayer, TerminalService};
use super::{Decorator, DecoratorFactory, Invocation, InvocationResult, PipelineService};
use crate::config::ServiceContext;

/// Ordered decorators composed around the terminal call.
///
/// Registration order is outermost to innermost: the first decorator's
/// pre-logic runs first and its post-logic runs last. The composed service is
/// built once; each call clones the boxed stack and drives it to completion.
#[derive(Clone)]
pub struct DecoratorPipeline {
    service: PipelineService,
    depth: usize,
}

impl DecoratorPipeline {
    /// Materializes each factory exactly once and composes the results.
    #[must_use]
    pub fn build(factories: &[Arc<dyn DecoratorFactory>], ctx: &ServiceContext) -> Self {
        let decorators = factories.iter().map(|factory| factory.create(ctx)).collect();
        Self::from_decorators(decorators)
    }

    /// Composes already constructed decorators, first entry outermost.
    #[must_use]
    pub fn from_decorators(decorators: Vec<Arc<dyn Decorator>>) -> Self {
        let depth = decorators.len();
        let service = decorators
            .into_iter()
            .rev()
            .fold(PipelineService::new(TerminalService), |inner, decorator| {
                PipelineService::new(DecoratorLayer::new(decorator).layer(inner))
            });
        Self { service, depth }
    }

    /// A pipeline with no decorators: the terminal call only.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_decorators(Vec::new())
    }

    /// Number of decorators in the chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Runs one invocation through the chain.
    pub async fn execute(&self, invocation: Invocation) -> InvocationResult {
        self.service.clone().oneshot(invocation).await
    }
}

impl Default for DecoratorPipeline {
    fn default() -> Self {
        Self::empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
