use crate::config::Config;
use crate::transfer::errors::ParamsError;
use crate::transfer::fragment::FRAGMENT_HEADER_LEN;
use std::path::Path;

pub type Result<T> = std::result::Result<T, ConfigIoError>;

#[derive(Debug)]
pub enum ConfigIoError {
    CreateDefault {
        path: String,
        source: Box<ConfigIoError>,
    },
    Read {
        path: String,
        source: std::io::Error,
    },
    ParseToml {
        path: String,
        source: toml::de::Error,
    },
    SerializeToml {
        source: toml::ser::Error,
    },
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    Write {
        path: String,
        source: std::io::Error,
    },
    InvalidTransfer {
        path: String,
        source: ParamsError,
    },
    DatagramSizeTooSmall {
        path: String,
        max_datagram_size: usize,
    },
}

impl std::fmt::Display for ConfigIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDefault { path, .. } => {
                write!(f, "failed to create default config at {path}")
            }
            Self::Read { path, .. } => write!(f, "failed reading config file {path}"),
            Self::ParseToml { path, .. } => write!(f, "invalid TOML in {path}"),
            Self::SerializeToml { .. } => write!(f, "failed serializing config to TOML"),
            Self::CreateDir { path, .. } => write!(f, "failed creating directory {path}"),
            Self::Write { path, .. } => write!(f, "failed writing config file {path}"),
            Self::InvalidTransfer { path, .. } => {
                write!(f, "invalid [transfer] section in {path}")
            }
            Self::DatagramSizeTooSmall {
                path,
                max_datagram_size,
            } => write!(
                f,
                "receiver.max_datagram_size {max_datagram_size} in {path} cannot hold a fragment header ({FRAGMENT_HEADER_LEN} bytes)"
            ),
        }
    }
}

impl std::error::Error for ConfigIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateDefault { source, .. } => Some(source.as_ref()),
            Self::Read { source, .. } => Some(source),
            Self::ParseToml { source, .. } => Some(source),
            Self::SerializeToml { source } => Some(source),
            Self::CreateDir { source, .. } => Some(source),
            Self::Write { source, .. } => Some(source),
            Self::InvalidTransfer { source, .. } => Some(source),
            Self::DatagramSizeTooSmall { .. } => None,
        }
    }
}

/// Loads `path`, writing a default config there first when it does not exist.
pub async fn load_or_create_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        let default_cfg = Config::default();
        save_config(path, &default_cfg)
            .await
            .map_err(|source| ConfigIoError::CreateDefault {
                path: path.display().to_string(),
                source: Box::new(source),
            })?;
        return Ok(default_cfg);
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigIoError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let cfg: Config = toml::from_str(&content).map_err(|source| ConfigIoError::ParseToml {
        path: path.display().to_string(),
        source,
    })?;
    validate(path, &cfg)?;

    Ok(cfg)
}

/// An all-zero `[transfer]` section is accepted: the receiver then waits uninitialized.
fn validate(path: &Path, cfg: &Config) -> Result<()> {
    if cfg.transfer.is_ready() {
        cfg.transfer
            .validate()
            .map_err(|source| ConfigIoError::InvalidTransfer {
                path: path.display().to_string(),
                source,
            })?;
    }
    if cfg.receiver.max_datagram_size <= FRAGMENT_HEADER_LEN {
        return Err(ConfigIoError::DatagramSizeTooSmall {
            path: path.display().to_string(),
            max_datagram_size: cfg.receiver.max_datagram_size,
        });
    }
    Ok(())
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
                path: parent.display().to_string(),
                source,
            })?;
    }

    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, toml_string)
        .await
        .map_err(|source| ConfigIoError::Write {
            path: path.display().to_string(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| ConfigIoError::Write {
            path: path.display().to_string(),
            source,
        })?;

    Ok(())
}
