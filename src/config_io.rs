use crate::config::Config;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, ConfigIoError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigIoError {
    #[error("failed to create default config at {}", path.display())]
    CreateDefault {
        path: PathBuf,
        source: Box<ConfigIoError>,
    },
    #[error("failed reading config file {}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML in {}", path.display())]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed serializing config to TOML")]
    SerializeToml { source: toml::ser::Error },
    #[error("failed creating directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed writing config file {}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Reads `path`, writing a default config there first when it is missing.
pub async fn load_or_create_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        let default_cfg = Config::default();
        save_config(path, &default_cfg)
            .await
            .map_err(|source| ConfigIoError::CreateDefault {
                path: path.to_path_buf(),
                source: Box::new(source),
            })?;
        return Ok(default_cfg);
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigIoError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    toml::from_str(&content).map_err(|source| ConfigIoError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

pub async fn save_config(path: impl AsRef<Path>, cfg: &Config) -> Result<()> {
    let path = path.as_ref();

    let toml_string =
        toml::to_string_pretty(cfg).map_err(|source| ConfigIoError::SerializeToml { source })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ConfigIoError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    tokio::fs::write(path, toml_string)
        .await
        .map_err(|source| ConfigIoError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!("magnet-stream-config-{tag}-{nanos}"))
    }

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let root = temp_dir("create");
        let path = root.join("nested").join("config.toml");

        let cfg = load_or_create_config(&path).await.expect("load");
        assert_eq!(cfg.api.port, 5000);
        assert!(path.exists());

        let again = load_or_create_config(&path).await.expect("reload");
        assert_eq!(again.history.file_name, cfg.history.file_name);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn invalid_toml_is_reported() {
        let root = temp_dir("invalid");
        std::fs::create_dir_all(&root).expect("mkdir");
        let path = root.join("config.toml");
        std::fs::write(&path, "[api\nport = ").expect("write");

        let err = load_or_create_config(&path).await.expect_err("should fail");
        assert!(matches!(err, ConfigIoError::ParseToml { .. }));
        let _ = std::fs::remove_dir_all(root);
    }
}
