use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{MismatchPolicy, PipelineConfig, StorageConfig};
use crate::contract::{
    chunk_index_of, chunk_key, CHUNK_CONTRACT_VERSION, CONTRACT_VERSION_ENV, DATASET_NAME_ENV,
    STORAGE_ENV, TOTAL_CHUNKS_ENV,
};
use crate::error::{PipelineError, Result};
use crate::job::{JobHandle, JobSpec};

/// Servicio remoto que crea jobs de `parallelism` tareas.
/// Se asume que la creación es atómica: o existen todos los slots o ninguno.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle>;
}

/// Qué chunk va a resolver cada slot de tarea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_index: usize,
    pub chunk_index: usize,
    pub chunk_key: String,
}

/// Plan de `parallelism` tareas: tarea `t` -> chunk `t + 1`.
pub fn plan_tasks(dataset_name: &str, parallelism: usize) -> Vec<TaskSpec> {
    (0..parallelism)
        .map(|task_index| {
            let chunk_index = chunk_index_of(task_index);
            TaskSpec {
                task_index,
                chunk_index,
                chunk_key: chunk_key(dataset_name, chunk_index),
            }
        })
        .collect()
}

/// Compara parallelism con la cantidad de chunks.
///
/// - `parallelism > total_chunks`: siempre error, habría tareas sin chunk.
/// - `parallelism < total_chunks`: los chunks `parallelism+1..=total_chunks`
///   nunca se procesan. Con `Warn` se devuelve ese rango; con `Reject`, error.
pub fn check_parallelism(
    parallelism: usize,
    total_chunks: usize,
    policy: MismatchPolicy,
) -> Result<Option<RangeInclusive<usize>>> {
    if parallelism > total_chunks {
        return Err(PipelineError::ParallelismMismatch {
            parallelism,
            total_chunks,
        });
    }

    if parallelism == total_chunks {
        return Ok(None);
    }

    match policy {
        MismatchPolicy::Reject => Err(PipelineError::ParallelismMismatch {
            parallelism,
            total_chunks,
        }),
        MismatchPolicy::Warn => {
            let unprocessed = chunk_index_of(parallelism)..=total_chunks;
            warn!(
                "parallelism={} < total_chunks={}: los chunks {}..={} NO se van a procesar",
                parallelism,
                total_chunks,
                unprocessed.start(),
                unprocessed.end()
            );
            Ok(Some(unprocessed))
        }
    }
}

/// Job creado más los chunks que quedaron sin tarea, si los hay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedJob {
    pub handle: JobHandle,
    pub unprocessed_chunks: Option<RangeInclusive<usize>>,
}

/// Lanza un job remoto con una tarea por chunk.
pub struct TaskDispatcher {
    config: PipelineConfig,
    service: Arc<dyn ExecutionService>,
}

impl TaskDispatcher {
    pub fn new(config: PipelineConfig, service: Arc<dyn ExecutionService>) -> Self {
        Self { config, service }
    }

    /// Environment común a todas las tareas del job.
    pub fn job_environment(&self, total_chunks: usize) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(DATASET_NAME_ENV.to_string(), self.config.dataset_name.clone());
        env.insert(STORAGE_ENV.to_string(), self.config.storage.to_env_value());
        env.insert(TOTAL_CHUNKS_ENV.to_string(), total_chunks.to_string());
        env.insert(
            CONTRACT_VERSION_ENV.to_string(),
            CHUNK_CONTRACT_VERSION.to_string(),
        );
        if !self.config.project_id.is_empty() {
            env.insert(
                "GOOGLE_CLOUD_PROJECT".to_string(),
                self.config.project_id.clone(),
            );
        }
        env
    }

    pub async fn dispatch(
        &self,
        job_name: &str,
        parallelism: usize,
        total_chunks: usize,
        command: &str,
    ) -> Result<DispatchedJob> {
        if job_name.trim().is_empty() {
            return Err(PipelineError::InvalidParameter(
                "job_name vacío".to_string(),
            ));
        }
        if parallelism == 0 {
            return Err(PipelineError::InvalidParameter(
                "parallelism debe ser > 0".to_string(),
            ));
        }
        let parallelism_u32 = u32::try_from(parallelism).map_err(|_| {
            PipelineError::InvalidParameter(format!("parallelism demasiado grande: {parallelism}"))
        })?;

        // Cada tarea abriría su propio store vacío
        if self.config.storage == StorageConfig::Memory {
            return Err(PipelineError::InvalidParameter(
                "un store en memoria no es visible para las tareas remotas".to_string(),
            ));
        }

        let unprocessed_chunks =
            check_parallelism(parallelism, total_chunks, self.config.mismatch_policy)?;

        for spec in plan_tasks(&self.config.dataset_name, parallelism) {
            debug!(
                "tarea {} -> chunk {} ({})",
                spec.task_index, spec.chunk_index, spec.chunk_key
            );
        }

        let spec = JobSpec {
            name: job_name.to_string(),
            region: self.config.region.clone(),
            parallelism: parallelism_u32,
            command: command.to_string(),
            environment: self.job_environment(total_chunks),
        };

        let handle = self.service.submit(spec).await.map_err(|e| match e {
            PipelineError::Dispatch(_) => e,
            other => PipelineError::Dispatch(other.to_string()),
        })?;

        if handle.parallelism != parallelism_u32 {
            warn!(
                "el servicio creó el job {} con parallelism={} (pedido {})",
                handle.job_id, handle.parallelism, parallelism
            );
        }

        info!(
            "job {} ({}) creado en {} con {} tareas para {} chunks",
            handle.name, handle.job_id, self.config.region, parallelism, total_chunks
        );
        Ok(DispatchedJob {
            handle,
            unprocessed_chunks,
        })
    }
}
