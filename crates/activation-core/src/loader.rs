//! Extension loader - the injected capability that runs activation hooks.

use std::future::Future;

use futures::future::BoxFuture;

use crate::ext_registry::ExtensionDescriptor;

/// Produces the activation hook for a descriptor.
///
/// The activator calls this at most once per extension id. The returned
/// future must not borrow the descriptor.
pub trait ExtensionLoader: Send + Sync {
    fn activate(&self, descriptor: &ExtensionDescriptor) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> ExtensionLoader for F
where
    F: Fn(&ExtensionDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn activate(&self, descriptor: &ExtensionDescriptor) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self(descriptor))
    }
}
