//! Reference-image catalog and artifact lookup
//!
//! The catalog is a directory holding one sub-directory per [`Category`].
//! Every file name coming from a client is reduced to its basename before it
//! touches the filesystem.

use crate::demux::ARTIFACT_PREFIX;
use crate::models::{Category, SourceImage};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

const CATALOG_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Strip any directory components from a client-supplied name.
pub fn safe_filename(name: &str) -> Result<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("Invalid file name: {}", name)))
}

fn is_catalog_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| CATALOG_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.dir_name())
    }

    /// Sorted image file names available in a category.
    pub async fn list(&self, category: Category) -> Result<Vec<String>> {
        let dir = self.category_dir(category);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(Error::NotFound("Category directory not found".to_string()));
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && is_catalog_image(&path) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    images.push(name.to_string());
                }
            }
        }
        images.sort();
        Ok(images)
    }

    /// Path of an existing catalog file.
    pub async fn resolve(&self, category: Category, filename: &str) -> Result<PathBuf> {
        let path = self.category_dir(category).join(safe_filename(filename)?);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(Error::NotFound(format!(
                "{} file not found: {}",
                category,
                safe_filename(filename)?
            ))),
        }
    }

    pub async fn load(&self, category: Category, filename: &str) -> Result<SourceImage> {
        let path = self.resolve(category, filename).await?;
        SourceImage::from_path(&path).await
    }
}

/// Path of an existing generated artifact in `output_dir`.
pub async fn resolve_artifact(output_dir: &Path, filename: &str) -> Result<PathBuf> {
    let name = safe_filename(filename)?;
    if !name.starts_with(ARTIFACT_PREFIX) {
        return Err(Error::Forbidden(format!("{} is not a generated image", name)));
    }

    let path = output_dir.join(name);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => Err(Error::NotFound("Output image not found".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn catalog_with_files() -> (TempDir, Catalog) {
        let dir = TempDir::new().unwrap();
        let vorm = dir.path().join("vorm");
        std::fs::create_dir_all(vorm.join("nested.png")).unwrap();
        for name in ["rond.jpeg", "ovaal.PNG", "notes.txt", "rechthoek.jpg", "scan.bmp"] {
            std::fs::write(vorm.join(name), b"img").unwrap();
        }
        let catalog = Catalog::new(dir.path().to_path_buf());
        (dir, catalog)
    }

    #[test]
    fn test_safe_filename_strips_directories() {
        assert_eq!(safe_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(safe_filename("rond.jpeg").unwrap(), "rond.jpeg");
        assert!(safe_filename("..").is_err());
        assert!(safe_filename("").is_err());
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let (_dir, catalog) = catalog_with_files();
        let images = catalog.list(Category::Shape).await.unwrap();
        assert_eq!(images, vec!["ovaal.PNG", "rechthoek.jpg", "rond.jpeg"]);
    }

    #[tokio::test]
    async fn test_list_missing_category_dir() {
        let (_dir, catalog) = catalog_with_files();
        let err = catalog.list(Category::Finish).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_rejects_traversal_and_missing() {
        let (_dir, catalog) = catalog_with_files();

        let path = catalog
            .resolve(Category::Shape, "../vorm/rond.jpeg")
            .await
            .unwrap();
        assert!(path.ends_with("vorm/rond.jpeg"));

        let err = catalog
            .resolve(Category::Shape, "vierkant.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = catalog
            .resolve(Category::Shape, "nested.png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_reads_bytes() {
        let (_dir, catalog) = catalog_with_files();
        let image = catalog.load(Category::Shape, "rond.jpeg").await.unwrap();
        assert_eq!(image.name, "rond.jpeg");
        assert_eq!(image.bytes, b"img".to_vec());
    }

    #[tokio::test]
    async fn test_resolve_artifact() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("remixed_image_1_0.png"), b"png").unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"no").unwrap();

        assert!(resolve_artifact(dir.path(), "remixed_image_1_0.png")
            .await
            .is_ok());
        assert!(matches!(
            resolve_artifact(dir.path(), "secret.txt").await.unwrap_err(),
            Error::Forbidden(_)
        ));
        assert!(matches!(
            resolve_artifact(dir.path(), "remixed_image_2_0.png")
                .await
                .unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
