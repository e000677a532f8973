use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::job::JobId;

pub type TaskId = String;

/// Un slot de tarea creado por el servicio de ejecución.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,

    /// Índice 0-based asignado por el scheduler
    pub task_index: u32,
    pub attempt: u32,

    pub command: String,

    /// Environment del job + BATCH_TASK_INDEX / BATCH_TASK_COUNT
    pub environment: BTreeMap<String, String>,
}
