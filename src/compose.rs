//! Compose bundle discovery and parsing.
//!
//! A bundle is a compose file found under the configured directory. Each
//! declared service is validated when the file is read, so a declaration
//! without an `image` never reaches reconciliation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Bundle discovery error types.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid bundle {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("bundle scan aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

/// A declared service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Every other key of the declaration, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ServiceDefinition {
    #[cfg(test)]
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            container_name: None,
            extra: BTreeMap::new(),
        }
    }

    /// Name the container is expected to run under: `container_name` when
    /// declared, the service key otherwise.
    pub fn effective_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.container_name.as_deref().unwrap_or(key)
    }
}

/// One parsed compose file.
#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    pub path: PathBuf,
    pub services: BTreeMap<String, ServiceDefinition>,
}

#[derive(Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, ServiceDefinition>,
}

/// List every `.yml` file below `dir`, sorted by path.
///
/// A missing directory holds no bundles.
pub fn list_bundle_files(dir: &Path) -> Result<Vec<PathBuf>, ComposeError> {
    if !dir.exists() {
        tracing::debug!("Compose directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| ComposeError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;

        let is_yml = entry.path().extension().map_or(false, |ext| ext == "yml");
        if entry.file_type().is_file() && is_yml {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Parse the bundle stored at `path`.
pub fn load_bundle(path: &Path) -> Result<Bundle, ComposeError> {
    let content = std::fs::read_to_string(path).map_err(|source| ComposeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_bundle(path, &content)
}

fn parse_bundle(path: &Path, content: &str) -> Result<Bundle, ComposeError> {
    let file: ComposeFile = serde_yaml::from_str(content).map_err(|source| ComposeError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Bundle {
        path: path.to_path_buf(),
        services: file.services,
    })
}

/// Discover and parse every bundle below `dir`.
pub fn discover_bundles(dir: &Path) -> Result<Vec<Bundle>, ComposeError> {
    list_bundle_files(dir)?
        .iter()
        .map(|path| load_bundle(path))
        .collect()
}

/// [`list_bundle_files`] on the blocking pool.
pub async fn scan_bundle_files(dir: &Path) -> Result<Vec<PathBuf>, ComposeError> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || list_bundle_files(&dir)).await?
}

/// [`discover_bundles`] on the blocking pool.
pub async fn scan_bundles(dir: &Path) -> Result<Vec<Bundle>, ComposeError> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || discover_bundles(&dir)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WEB_BUNDLE: &str = r#"
version: "2"
services:
  web:
    image: nginx
    ports:
      - "80:80"
  db:
    image: postgres
    container_name: main-db
"#;

    #[test]
    fn test_parse_bundle() {
        let bundle = parse_bundle(Path::new("web.yml"), WEB_BUNDLE).unwrap();
        assert_eq!(bundle.services.len(), 2);

        let web = &bundle.services["web"];
        assert_eq!(web.image, "nginx");
        assert_eq!(web.effective_name("web"), "web");
        assert_eq!(web.extra["ports"], serde_json::json!(["80:80"]));

        let db = &bundle.services["db"];
        assert_eq!(db.effective_name("db"), "main-db");
        assert!(db.extra.is_empty());
    }

    #[test]
    fn test_missing_image_is_rejected() {
        let content = "services:\n  web:\n    container_name: web\n";
        let err = parse_bundle(Path::new("bad.yml"), content).unwrap_err();
        assert!(matches!(err, ComposeError::Parse { .. }));
        assert!(err.to_string().contains("bad.yml"));
    }

    #[test]
    fn test_bundle_without_services() {
        let bundle = parse_bundle(Path::new("empty.yml"), "version: \"2\"\n").unwrap();
        assert!(bundle.services.is_empty());
    }

    #[test]
    fn test_definition_serializes_flat() {
        let bundle = parse_bundle(Path::new("web.yml"), WEB_BUNDLE).unwrap();
        let json = serde_json::to_value(&bundle.services["web"]).unwrap();
        assert_eq!(json, serde_json::json!({"image": "nginx", "ports": ["80:80"]}));
    }

    #[test]
    fn test_discover_recursively() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("b.yml"), WEB_BUNDLE).unwrap();
        std::fs::write(
            dir.path().join("nested/deeper/a.yml"),
            "services:\n  cache:\n    image: redis\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a bundle").unwrap();
        std::fs::write(dir.path().join("c.yaml"), "ignored: true").unwrap();

        let files = list_bundle_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "yml"));

        let bundles = discover_bundles(dir.path()).unwrap();
        let images: Vec<_> = bundles
            .iter()
            .flat_map(|b| b.services.values().map(|s| s.image.clone()))
            .collect();
        assert_eq!(images.len(), 3);
        assert!(images.contains(&"redis".to_string()));
    }

    #[test]
    fn test_missing_directory_has_no_bundles() {
        let dir = TempDir::new().unwrap();
        let files = list_bundle_files(&dir.path().join("absent")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_invalid_bundle_fails_discovery() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.yml"), "services:\n  web:\n    ports: []\n").unwrap();
        assert!(discover_bundles(dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_scans_run_off_the_runtime() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/web.yml"), WEB_BUNDLE).unwrap();

        let files = scan_bundle_files(dir.path()).await.unwrap();
        assert_eq!(files, vec![dir.path().join("nested/web.yml")]);

        let bundles = scan_bundles(dir.path()).await.unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].services["db"].image, "postgres");

        assert!(scan_bundles(&dir.path().join("absent")).await.unwrap().is_empty());

        std::fs::write(dir.path().join("bad.yml"), "services:\n  web: {}\n").unwrap();
        assert!(matches!(
            scan_bundles(dir.path()).await,
            Err(ComposeError::Parse { .. })
        ));
    }
}
