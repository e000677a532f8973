use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::StorageConfig;
use crate::contract::{
    chunk_index_of, chunk_key, processed_key, CHUNK_CONTRACT_VERSION, CONTRACT_VERSION_ENV,
    DATASET_NAME_ENV, STORAGE_ENV, TASK_INDEX_ENV,
};
use crate::error::{PipelineError, Result};
use crate::store::ChunkStore;

/// Columnas que suma/resta la transformación.
pub const INPUT_COLUMNS: [&str; 3] = ["number_1", "number_2", "number_3"];
/// Columna que se agrega a cada fila.
pub const RESULT_COLUMN: &str = "processed_result";

/// Aplica `processed_result = number_1 + number_2 - number_3` a un CSV
/// completo. Un campo no entero hace fallar el chunk entero.
pub fn process_rows(input: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut reader = csv::Reader::from_reader(input);
    let header = reader.headers()?.clone();

    let mut positions = [0usize; 3];
    for (slot, name) in positions.iter_mut().zip(INPUT_COLUMNS) {
        *slot = header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PipelineError::Transform {
                row: 0,
                column: name.to_string(),
                value: "<columna ausente>".to_string(),
            })?;
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut out_header = header.clone();
    out_header.push_field(RESULT_COLUMN);
    writer.write_record(&out_header)?;

    let mut rows = 0;
    for (i, record) in reader.records().enumerate() {
        let mut record = record?;
        let row = i + 1;

        let mut values = [0i64; 3];
        for ((value, &pos), name) in values.iter_mut().zip(positions.iter()).zip(INPUT_COLUMNS) {
            let raw = record.get(pos).unwrap_or("");
            *value = raw.trim().parse::<i64>().map_err(|_| PipelineError::Transform {
                row,
                column: name.to_string(),
                value: raw.to_string(),
            })?;
        }

        let result = values[0]
            .checked_add(values[1])
            .and_then(|sum| sum.checked_sub(values[2]))
            .ok_or_else(|| PipelineError::Transform {
                row,
                column: RESULT_COLUMN.to_string(),
                value: format!("{} + {} - {} desborda i64", values[0], values[1], values[2]),
            })?;
        record.push_field(&result.to_string());
        writer.write_record(&record)?;
        rows += 1;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::io("<salida en memoria>", e.into_error()))?;
    Ok((bytes, rows))
}

/// Lo que una tarea remota necesita saber, tomado de su environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvironment {
    pub task_index: usize,
    pub dataset_name: String,
    pub storage: StorageConfig,
}

impl TaskEnvironment {
    /// `lookup` suele ser `|k| std::env::var(k).ok()`.
    /// Sin BATCH_TASK_INDEX se asume la tarea 0.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let task_index = match lookup(TASK_INDEX_ENV) {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                PipelineError::Config(format!("{TASK_INDEX_ENV}={raw} no es un índice válido"))
            })?,
            None => 0,
        };

        if let Some(version) = lookup(CONTRACT_VERSION_ENV) {
            if version.trim() != CHUNK_CONTRACT_VERSION.to_string() {
                return Err(PipelineError::Config(format!(
                    "contrato de chunks v{} pero este worker implementa v{}",
                    version, CHUNK_CONTRACT_VERSION
                )));
            }
        }

        let dataset_name = lookup(DATASET_NAME_ENV)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::Config(format!("falta {DATASET_NAME_ENV}")))?;

        let storage = lookup(STORAGE_ENV)
            .ok_or_else(|| PipelineError::Config(format!("falta {STORAGE_ENV}")))
            .and_then(|v| StorageConfig::from_env_value(&v))?;

        Ok(Self {
            task_index,
            dataset_name,
            storage,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedChunk {
    pub task_index: usize,
    pub chunk_index: usize,
    pub input_key: String,
    pub output_key: String,
    pub rows: usize,
}

/// Resuelve el chunk de una tarea, lo transforma y sube el resultado.
pub struct ChunkProcessor {
    store: Arc<dyn ChunkStore>,
    dataset_name: String,
}

impl ChunkProcessor {
    pub fn new(store: Arc<dyn ChunkStore>, dataset_name: impl Into<String>) -> Self {
        Self {
            store,
            dataset_name: dataset_name.into(),
        }
    }

    pub async fn process(&self, task_index: usize) -> Result<ProcessedChunk> {
        let chunk_index = chunk_index_of(task_index);
        let input_key = chunk_key(&self.dataset_name, chunk_index);
        let output_key = processed_key(&self.dataset_name, chunk_index);

        let data = self.store.get(&input_key).await?;
        let (processed, rows) = process_rows(&data)?;
        self.store.put(&output_key, processed).await?;

        info!(
            "tarea {} procesó chunk {} ({} filas) -> {}",
            task_index, input_key, rows, output_key
        );

        Ok(ProcessedChunk {
            task_index,
            chunk_index,
            input_key,
            output_key,
            rows,
        })
    }
}
