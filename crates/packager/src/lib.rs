//! Workspace packaging.
//!
//! Produces the gzip-compressed tar archive a pipeline uploads in its first
//! step. Compression runs off the async runtime via `spawn_blocking`.

use std::fs::File;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::task::spawn_blocking;
use tracing::debug;

use deploy_core::{DeployError, Packager};

/// Name the archive contents are rooted under. The remote extraction step
/// unpacks in place, so every entry lands below this directory.
pub const ARCHIVE_ROOT: &str = "src";

/// `Packager` implementation producing `.tar.gz` archives.
pub struct TarGzPackager;

#[async_trait]
impl Packager for TarGzPackager {
    async fn package(&self, source_dir: &Path, archive_path: &Path) -> Result<(), DeployError> {
        let source = source_dir.to_owned();
        let archive = archive_path.to_owned();
        let result = spawn_blocking(move || package_sync(&source, &archive)).await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(DeployError::Package {
                path: source_dir.to_owned(),
                detail: err.to_string(),
            }),
            Err(err) => Err(DeployError::Package {
                path: source_dir.to_owned(),
                detail: format!("packaging task failed: {err}"),
            }),
        }
    }
}

fn package_sync(source_dir: &Path, archive_path: &Path) -> io::Result<()> {
    if !source_dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", source_dir.display()),
        ));
    }
    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(ARCHIVE_ROOT, source_dir)?;
    let encoder = builder.into_inner()?;
    let file = encoder.finish()?;
    let archive_bytes = file.metadata().map(|meta| meta.len()).unwrap_or(0);
    debug!(
        source = %source_dir.display(),
        archive = %archive_path.display(),
        archive_bytes,
        "workspace packaged"
    );
    Ok(())
}
