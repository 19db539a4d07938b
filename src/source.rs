//! Where the input bytes come from
//!
//! Either the request body, or a file under the served root directory.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;

use crate::primitive::{
    anyhow::{self, Context},
    systime2datetime,
    tracing::instrument,
    DateTime,
};

/// An absolute, resolved file path that was trusted when it was created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RealPath(PathBuf);

impl RealPath {
    /// Canonicalize a directory given on the command line.
    pub async fn root(path: impl AsRef<Path>) -> anyhow::Result<RealPath> {
        let path = path.as_ref();
        let real = tokio::fs::canonicalize(path)
            .await
            .with_context(|| format!("canonicalizing root {path:?}"))?;
        anyhow::ensure!(real.is_dir(), "root {real:?} is not a directory");
        Ok(RealPath(real))
    }
}

/// Expose the &Path reference
impl AsRef<Path> for RealPath {
    fn as_ref(&self) -> &Path {
        self.0.as_ref()
    }
}

/// Raw image bytes placed into the request context.
#[derive(Debug, Clone)]
pub struct ImageStash {
    /// The encoded image
    pub bytes: Bytes,
    /// File modification time, when backed by a file
    pub lastmod: Option<DateTime>,
}

impl ImageStash {
    /// From an upload. An empty body is no image at all.
    pub fn from_body(body: Bytes) -> Option<Self> {
        (!body.is_empty()).then_some(Self {
            bytes: body,
            lastmod: None,
        })
    }
}

/// Given a normal, relative path (to the given root), attempt to
/// canonicalize it by following symlinks, producing an absolute path
/// that is still under the root.
#[instrument(err, level = "debug")]
pub async fn pathresolve(pathuser: &Path, root: &RealPath) -> anyhow::Result<RealPath> {
    // Do a quick check to see if the path is "normal"
    if !pathuser
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::RootDir))
    {
        anyhow::bail!("Path {pathuser:?} is not a normal path");
    }

    // Leading "/" would make join() discard the root.
    let relative = pathuser.strip_prefix("/").unwrap_or(pathuser);
    let meantpath = root.as_ref().join(relative);
    let path = tokio::fs::canonicalize(&meantpath)
        .await
        .with_context(|| format!("canonicalizing {meantpath:?}"))?;

    // Decide whether the resolved path is a subpath of the root
    if !path.starts_with(root.as_ref()) {
        anyhow::bail!("Path {path:?} is not a subpath of the root {root:?}");
    }

    Ok(RealPath(path))
}

/// Read a regular file that plausibly holds an image.
///
/// Files whose extension names a known non-image type are refused
/// without being read. The content decides the real type later.
#[instrument(err, level = "debug")]
pub async fn load_file(path: &RealPath) -> anyhow::Result<ImageStash> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("stat {path:?}"))?;
    anyhow::ensure!(meta.is_file(), "{path:?} is not a regular file");

    if let Some(guess) = mime_guess::from_path(path).first() {
        anyhow::ensure!(
            guess.type_() == mime_guess::mime::IMAGE,
            "{path:?} looks like {guess}, not an image"
        );
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {path:?}"))?;
    let lastmod = meta.modified().ok().and_then(systime2datetime);
    Ok(ImageStash {
        bytes: Bytes::from(bytes),
        lastmod,
    })
}

/// Resolve and read in one go.
pub async fn stash_from_root(pathuser: &Path, root: &RealPath) -> anyhow::Result<ImageStash> {
    let path = pathresolve(pathuser, root).await?;
    load_file(&path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fixture, format::ImageType};

    async fn served() -> (tempfile::TempDir, RealPath) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("album")).unwrap();
        std::fs::write(
            dir.path().join("album/cat.png"),
            fixture::encoded(8, 8, ImageType::Png),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(
            dir.path().join("noext"),
            fixture::encoded(4, 4, ImageType::Gif),
        )
        .unwrap();
        let root = RealPath::root(dir.path()).await.unwrap();
        (dir, root)
    }

    #[test]
    fn empty_body_is_no_image() {
        assert!(ImageStash::from_body(Bytes::new()).is_none());
        let stash = ImageStash::from_body(Bytes::from_static(b"x")).unwrap();
        assert_eq!(stash.bytes.as_ref(), b"x");
        assert!(stash.lastmod.is_none());
    }

    #[tokio::test]
    async fn resolves_under_root() {
        let (_dir, root) = served().await;
        let p = pathresolve(Path::new("album/cat.png"), &root).await.unwrap();
        assert!(p.as_ref().starts_with(root.as_ref()));
        let p = pathresolve(Path::new("/album/cat.png"), &root).await.unwrap();
        assert!(p.as_ref().ends_with("album/cat.png"));
    }

    #[tokio::test]
    async fn rejects_escapes_and_missing() {
        let (_dir, root) = served().await;
        assert!(pathresolve(Path::new("../etc/passwd"), &root).await.is_err());
        assert!(pathresolve(Path::new("album/../album/cat.png"), &root).await.is_err());
        assert!(pathresolve(Path::new("./album"), &root).await.is_err());
        assert!(pathresolve(Path::new("album/dog.png"), &root).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rejects_symlinks_out_of_root() {
        let (dir, root) = served().await;
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("x.png"), b"x").unwrap();
        std::os::unix::fs::symlink(outside.path().join("x.png"), dir.path().join("link.png"))
            .unwrap();
        assert!(pathresolve(Path::new("link.png"), &root).await.is_err());
    }

    #[tokio::test]
    async fn loads_images_only() {
        let (_dir, root) = served().await;
        let stash = stash_from_root(Path::new("album/cat.png"), &root).await.unwrap();
        assert_eq!(stash.bytes, fixture::encoded(8, 8, ImageType::Png));
        assert!(stash.lastmod.is_some());

        // No extension: let the content decide.
        assert!(stash_from_root(Path::new("noext"), &root).await.is_ok());

        assert!(stash_from_root(Path::new("notes.txt"), &root).await.is_err());
        assert!(stash_from_root(Path::new("album"), &root).await.is_err());
    }
}
