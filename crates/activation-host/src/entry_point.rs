//! Entry point loader
//!
//! Resolves each extension's declared `main` against the manifest directory.
//! Extensions without an entry point activate trivially.

use std::path::PathBuf;

use activation_core::{ExtensionDescriptor, ExtensionLoader};
use anyhow::{bail, Context};
use futures::future::BoxFuture;
use futures::FutureExt;

#[derive(Debug, Clone)]
pub struct EntryPointLoader {
    base_dir: PathBuf,
}

impl EntryPointLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl ExtensionLoader for EntryPointLoader {
    fn activate(&self, descriptor: &ExtensionDescriptor) -> BoxFuture<'static, anyhow::Result<()>> {
        let id = descriptor.id.clone();
        let entry = descriptor.main.as_ref().map(|main| self.base_dir.join(main));

        async move {
            let Some(entry) = entry else {
                tracing::debug!("Extension '{}' has no entry point", id);
                return Ok(());
            };

            let metadata = tokio::fs::metadata(&entry)
                .await
                .with_context(|| format!("entry point {} not found", entry.display()))?;
            if !metadata.is_file() {
                bail!("entry point {} is not a file", entry.display());
            }

            tracing::debug!("Loaded entry point {} for '{}'", entry.display(), id);
            Ok(())
        }
        .boxed()
    }
}
