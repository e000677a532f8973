use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;
pub const DEFAULT_REGION: &str = "us-central1";

/// Dónde viven los chunks remotos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Directorio local (por ejemplo un bucket montado con gcsfuse).
    Local { root: PathBuf },
    /// Bucket de Google Cloud Storage.
    Gcs { bucket: String },
    /// Sólo para pruebas.
    Memory,
}

impl StorageConfig {
    /// Valor que se le pasa a las tareas remotas para que abran el mismo store.
    pub fn to_env_value(&self) -> String {
        match self {
            StorageConfig::Local { root } => format!("file://{}", root.display()),
            StorageConfig::Gcs { bucket } => format!("gs://{}", bucket),
            StorageConfig::Memory => "memory://".to_string(),
        }
    }

    pub fn from_env_value(value: &str) -> Result<Self> {
        if let Some(root) = value.strip_prefix("file://") {
            Ok(StorageConfig::Local {
                root: PathBuf::from(root),
            })
        } else if let Some(bucket) = value.strip_prefix("gs://") {
            if bucket.is_empty() {
                return Err(PipelineError::Config("bucket vacío".to_string()));
            }
            Ok(StorageConfig::Gcs {
                bucket: bucket.to_string(),
            })
        } else if value == "memory://" {
            Ok(StorageConfig::Memory)
        } else {
            Err(PipelineError::Config(format!(
                "storage desconocido: {value}"
            )))
        }
    }
}

/// Qué hacer cuando parallelism < total de chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Loguea un warning con los chunks que nunca se van a procesar.
    #[default]
    Warn,
    /// Rechaza el dispatch.
    Reject,
}

/// Configuración explícita del pipeline. Se pasa a Splitter, TaskDispatcher
/// y ChunkProcessor; ninguno lee el entorno por su cuenta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub project_id: String,
    pub region: String,
    /// Prefijo de las keys de todos los chunks de un split.
    pub dataset_name: String,
    pub storage: StorageConfig,
    pub chunk_size: usize,
    pub upload_concurrency: usize,
    pub mismatch_policy: MismatchPolicy,
}

impl PipelineConfig {
    pub fn new(dataset_name: impl Into<String>, storage: StorageConfig) -> Self {
        Self {
            project_id: String::new(),
            region: DEFAULT_REGION.to_string(),
            dataset_name: dataset_name.into(),
            storage,
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            mismatch_policy: MismatchPolicy::Warn,
        }
    }

    /// Lee la configuración de las variables de entorno.
    /// `STORAGE_ROOT` tiene prioridad sobre `GOOGLE_CLOUD_BUCKET_NAME`.
    pub fn from_env(default_dataset: &str) -> Result<Self> {
        let storage = if let Ok(root) = env::var("STORAGE_ROOT") {
            StorageConfig::Local {
                root: PathBuf::from(root),
            }
        } else if let Ok(bucket) = env::var("GOOGLE_CLOUD_BUCKET_NAME") {
            StorageConfig::Gcs { bucket }
        } else {
            return Err(PipelineError::Config(
                "falta STORAGE_ROOT o GOOGLE_CLOUD_BUCKET_NAME".to_string(),
            ));
        };

        let dataset_name =
            env::var("DATASET_NAME").unwrap_or_else(|_| default_dataset.to_string());

        let config = Self {
            project_id: env::var("GOOGLE_CLOUD_PROJECT").unwrap_or_default(),
            region: env::var("GOOGLE_CLOUD_REGION")
                .unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            dataset_name,
            storage,
            chunk_size: parse_env_or("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            upload_concurrency: parse_env_or("UPLOAD_CONCURRENCY", DEFAULT_UPLOAD_CONCURRENCY)?,
            mismatch_policy: match env::var("STRICT_PARALLELISM").as_deref() {
                Ok("1") | Ok("true") => MismatchPolicy::Reject,
                _ => MismatchPolicy::Warn,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset_name.is_empty() {
            return Err(PipelineError::InvalidParameter(
                "dataset_name vacío".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(PipelineError::InvalidParameter(
                "chunk_size debe ser > 0".to_string(),
            ));
        }
        if self.upload_concurrency == 0 {
            return Err(PipelineError::InvalidParameter(
                "upload_concurrency debe ser > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env_or(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|_| PipelineError::Config(format!("{name}={raw} no es un número"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_config_ida_y_vuelta_por_env() {
        let cases = vec![
            StorageConfig::Local {
                root: PathBuf::from("/mnt/share"),
            },
            StorageConfig::Gcs {
                bucket: "demo-bucket".to_string(),
            },
            StorageConfig::Memory,
        ];
        for c in cases {
            assert_eq!(StorageConfig::from_env_value(&c.to_env_value()).unwrap(), c);
        }
    }

    #[test]
    fn storage_config_rechaza_esquema_desconocido() {
        assert!(StorageConfig::from_env_value("s3://x").is_err());
        assert!(StorageConfig::from_env_value("gs://").is_err());
    }

    #[test]
    fn validate_rechaza_chunk_size_cero() {
        let mut cfg = PipelineConfig::new("ds", StorageConfig::Memory);
        assert!(cfg.validate().is_ok());
        cfg.chunk_size = 0;
        assert!(matches!(
            cfg.validate(),
            Err(PipelineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn validate_rechaza_dataset_vacio() {
        let cfg = PipelineConfig::new("", StorageConfig::Memory);
        assert!(cfg.validate().is_err());
    }
}
