use std::io;

use thiserror::Error;

/// Errores del pipeline de chunking y despacho.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No se pudo crear un directorio, abrir o escribir un archivo.
    #[error("error de IO en {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("CSV mal formado: {0}")]
    Csv(#[from] csv::Error),

    #[error("error del store remoto ({key}): {message}")]
    Store { key: String, message: String },

    /// Uno o más chunks no se subieron. Lleva los índices fallidos.
    #[error("fallaron {} de {total} uploads (chunks {failed:?})", .failed.len())]
    Upload { failed: Vec<usize>, total: usize },

    #[error("no se pudo crear el job remoto: {0}")]
    Dispatch(String),

    #[error("parallelism={parallelism} no coincide con total_chunks={total_chunks}")]
    ParallelismMismatch {
        parallelism: usize,
        total_chunks: usize,
    },

    #[error("parámetro inválido: {0}")]
    InvalidParameter(String),

    /// Campo numérico mal formado; falla la tarea completa.
    #[error("fila {row}: columna {column} no es un entero ({value:?})")]
    Transform {
        row: usize,
        column: String,
        value: String,
    },

    #[error("configuración inválida: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn io(path: impl AsRef<std::path::Path>, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn store(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PipelineError::Store {
            key: key.into(),
            message: err.to_string(),
        }
    }
}
