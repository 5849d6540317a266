//! Interceptor chain composition at the call-invoker level (§4.8).
//!
//! An interceptor observes/rewrites the call's outgoing metadata before
//! headers are composed. Composition order: the most-recently-added
//! interceptor (or batch) runs outermost/first; within one batch-added
//! array, interceptors run in declaration order as a single unit.

use std::sync::Arc;

use crate::metadata::Metadata;
use crate::status::Status;

/// What an interceptor sees and may rewrite before the call proceeds.
pub struct InterceptorContext {
    pub metadata: Metadata,
}

pub trait Interceptor: Send + Sync {
    fn call(&self, ctx: InterceptorContext) -> Result<InterceptorContext, Status>;
}

/// Lifts a plain `metadata -> metadata` function into an [`Interceptor`],
/// matching the base spec's "`metadata_interceptor` form".
pub struct MetadataInterceptor<F>(F);

impl<F> MetadataInterceptor<F>
where
    F: Fn(Metadata) -> Metadata + Send + Sync,
{
    pub fn new(f: F) -> Self {
        MetadataInterceptor(f)
    }
}

impl<F> Interceptor for MetadataInterceptor<F>
where
    F: Fn(Metadata) -> Metadata + Send + Sync,
{
    fn call(&self, ctx: InterceptorContext) -> Result<InterceptorContext, Status> {
        Ok(InterceptorContext { metadata: (self.0)(ctx.metadata) })
    }
}

pub fn metadata_interceptor<F>(f: F) -> Arc<dyn Interceptor>
where
    F: Fn(Metadata) -> Metadata + Send + Sync + 'static,
{
    Arc::new(MetadataInterceptor::new(f))
}

enum ChainEntry {
    Single(Arc<dyn Interceptor>),
    Batch(Vec<Arc<dyn Interceptor>>),
}

/// A sequence of interceptors (and interceptor batches) composed around a
/// terminal call invoker.
#[derive(Default)]
pub struct InterceptorChain {
    entries: Vec<ChainEntry>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        InterceptorChain { entries: Vec::new() }
    }

    /// Adds one interceptor. The most recently added entry runs first.
    pub fn add(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.entries.push(ChainEntry::Single(interceptor));
    }

    /// Adds an array of interceptors as a single unit: the array runs in
    /// declaration order, nested within the position this call occupies
    /// relative to individually-added interceptors.
    pub fn add_batch(&mut self, interceptors: Vec<Arc<dyn Interceptor>>) {
        self.entries.push(ChainEntry::Batch(interceptors));
    }

    /// Flattens the chain into actual execution order.
    pub fn execution_order(&self) -> Vec<Arc<dyn Interceptor>> {
        let mut result = Vec::new();
        for entry in self.entries.iter().rev() {
            match entry {
                ChainEntry::Single(i) => result.push(i.clone()),
                ChainEntry::Batch(batch) => result.extend(batch.iter().cloned()),
            }
        }
        result
    }

    /// Runs every interceptor in execution order over `ctx`.
    pub fn apply(&self, mut ctx: InterceptorContext) -> Result<InterceptorContext, Status> {
        for interceptor in self.execution_order() {
            ctx = interceptor.call(ctx)?;
        }
        Ok(ctx)
    }
}
