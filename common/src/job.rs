use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type JobId = String;

/// Especificación que recibe el servicio de ejecución remota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub region: String,

    /// Cantidad de slots de tarea (índices 0..parallelism)
    pub parallelism: u32,

    /// Comando base, idéntico para todas las tareas
    pub command: String,

    /// Environment común; el servicio agrega BATCH_TASK_INDEX a cada tarea
    pub environment: BTreeMap<String, String>,
}

/// Handle opaco de un job creado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub name: String,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    Running,
    Failed,
    Succeeded,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Succeeded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub region: String,
    pub status: JobStatus,
    pub parallelism: u32,
    pub command: String,

    /// -------- Métricas del job --------
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub retries: u32,
}

impl JobInfo {
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            job_id: self.id.clone(),
            name: self.name.clone(),
            parallelism: self.parallelism,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_se_serializa_en_mayusculas() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Succeeded).unwrap(),
            "\"SUCCEEDED\""
        );
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn job_spec_viaja_como_json() {
        let mut environment = BTreeMap::new();
        environment.insert("DATASET_NAME".to_string(), "large_data".to_string());
        let spec = JobSpec {
            name: "script-job-1234".to_string(),
            region: "us-central1".to_string(),
            parallelism: 100,
            command: "worker process-chunk".to_string(),
            environment,
        };

        let json = serde_json::to_string(&spec).unwrap();
        let back: JobSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
