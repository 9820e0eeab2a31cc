//! Activation Host - serves activation requests against a manifest
//!
//! ```text
//! activation-host <extensions.toml> [--json]
//! ```
//!
//! # Startup Flow
//!
//! 1. **Parse the manifest** - `[activator]` settings and `[[extension]]` descriptors
//! 2. **Register descriptors** - duplicates are reported and skipped
//! 3. **Complete registration** - opens the readiness gate
//! 4. **Fire startup events** - `activator.startup_events` (default `["*"]`)
//! 5. **Serve stdin** - one request per line, see [`session`]
//! 6. **Report** - printed when stdin closes
//!
//! Entry points (`main`) are resolved relative to the manifest's directory.
//!
//! # Environment Variables
//!
//! - `ACTIVATION_LOG` - Log level (default: "info")

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use activation_core::{ActivationManifest, ExtensionActivator, TracingSink};
use anyhow::{Context, Result};
use tokio::io::{AsyncWriteExt, BufReader};

mod entry_point;
mod session;

use entry_point::EntryPointLoader;
use session::Session;

const USAGE: &str = "Usage: activation-host <extensions.toml> [--json]";

#[derive(Debug)]
struct Args {
    manifest: PathBuf,
    json: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut manifest: Option<PathBuf> = None;
    let mut json = false;
    for a in args {
        match a.as_str() {
            "--json" => json = true,
            "-h" | "--help" => anyhow::bail!(USAGE),
            flag if flag.starts_with("--") => anyhow::bail!("unknown flag '{}'\n{}", flag, USAGE),
            path if manifest.is_none() => manifest = Some(PathBuf::from(path)),
            extra => anyhow::bail!("unexpected argument '{}'\n{}", extra, USAGE),
        }
    }
    let manifest = manifest.ok_or_else(|| anyhow::anyhow!(USAGE))?;
    Ok(Args { manifest, json })
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    // Use ACTIVATION_LOG env var for log level configuration, default to "info"
    use tracing_subscriber::EnvFilter;
    let filter =
        EnvFilter::try_from_env("ACTIVATION_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(env::args().skip(1))?;
    rt.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let manifest = ActivationManifest::load(&args.manifest)
        .with_context(|| format!("loading manifest at {}", args.manifest.display()))?;
    let base_dir = args
        .manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    tracing::info!(
        "Loaded {} extensions from {}",
        manifest.extensions.len(),
        args.manifest.display()
    );

    let activator = Arc::new(ExtensionActivator::new(
        manifest.activator,
        Arc::new(EntryPointLoader::new(base_dir)),
        Arc::new(TracingSink),
    ));
    tracing::debug!(
        "Activator max depth {}, startup events {:?}",
        activator.config().max_depth,
        activator.config().startup_events
    );
    activator.register(manifest.extensions);
    activator.registration_complete();
    activator.activate_startup().await;

    let session = Session::new(Arc::clone(&activator), args.json);
    let mut stdout = tokio::io::stdout();
    let served = session
        .run(BufReader::new(tokio::io::stdin()), &mut stdout)
        .await
        .context("serving requests")?;
    tracing::debug!("Served {} requests", served);

    stdout.write_all(session.report()?.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["ext.toml", "--json"]).unwrap();
        assert_eq!(parsed.manifest, PathBuf::from("ext.toml"));
        assert!(parsed.json);

        let parsed = args(&["ext.toml"]).unwrap();
        assert!(!parsed.json);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(args(&[]).is_err());
        assert!(args(&["a.toml", "b.toml"]).is_err());
        assert!(args(&["--verbose", "a.toml"]).is_err());
    }

    #[tokio::test]
    async fn test_missing_manifest_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = run(Args {
            manifest: temp.path().join("extensions.toml"),
            json: false,
        })
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("manifest not found"));
    }
}
