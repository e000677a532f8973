// master/src/state.rs

use chrono::Utc;
use common::contract::{TASK_COUNT_ENV, TASK_INDEX_ENV};
use common::{JobId, JobInfo, JobSpec, JobStatus, Task, TaskId, WorkerId};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};
use tracing::{info, warn};

use crate::MAX_TASK_ATTEMPTS;

#[derive(Clone, Default)]
pub struct AppState {
    pub jobs: Arc<Mutex<HashMap<JobId, JobInfo>>>,
    pub workers: Arc<Mutex<HashMap<WorkerId, WorkerMeta>>>,
    // tareas pendientes de asignar
    pub tasks_queue: Arc<Mutex<VecDeque<Task>>>,
    // tareas ya asignadas pero no completadas
    pub in_flight: Arc<Mutex<HashMap<TaskId, InFlight>>>,
}

#[derive(Debug, Clone)]
pub struct WorkerMeta {
    pub hostname: String,
    pub last_heartbeat: SystemTime,
    pub dead: bool,
    pub max_concurrency: u32,

    // Métricas
    pub tasks_started: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
}

#[derive(Debug, Clone)]
pub struct InFlight {
    pub task: Task,
    pub worker_id: WorkerId,
    pub started_at: SystemTime,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crea el job y sus `parallelism` slots (índices 0..parallelism).
    /// Todos los slots entran a la cola juntos o no entra ninguno.
    pub fn create_job(&self, spec: JobSpec) -> Result<JobInfo, String> {
        if spec.parallelism == 0 {
            return Err("parallelism debe ser > 0".to_string());
        }
        if spec.name.trim().is_empty() {
            return Err("name vacío".to_string());
        }

        let job_id = uuid::Uuid::new_v4().to_string();

        let tasks: Vec<Task> = (0..spec.parallelism)
            .map(|task_index| {
                let mut environment = spec.environment.clone();
                environment.insert(TASK_INDEX_ENV.to_string(), task_index.to_string());
                environment.insert(TASK_COUNT_ENV.to_string(), spec.parallelism.to_string());
                Task {
                    id: uuid::Uuid::new_v4().to_string(),
                    job_id: job_id.clone(),
                    task_index,
                    attempt: 0,
                    command: spec.command.clone(),
                    environment,
                }
            })
            .collect();

        let job_info = JobInfo {
            id: job_id.clone(),
            name: spec.name,
            region: spec.region,
            status: JobStatus::Accepted,
            parallelism: spec.parallelism,
            command: spec.command,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            total_tasks: spec.parallelism,
            completed_tasks: 0,
            failed_tasks: 0,
            retries: 0,
        };

        // jobs y cola bajo ambos locks: un worker nunca ve slots sin job
        {
            let mut jobs = self.jobs.lock().unwrap();
            let mut queue = self.tasks_queue.lock().unwrap();
            jobs.insert(job_id.clone(), job_info.clone());
            queue.extend(tasks);
        }

        info!(
            "job {} ({}) creado en {} con {} tareas",
            job_info.name, job_id, job_info.region, job_info.parallelism
        );
        Ok(job_info)
    }

    pub fn job(&self, job_id: &str) -> Option<JobInfo> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    pub fn register_worker(&self, hostname: String, max_concurrency: u32) -> WorkerId {
        let worker_id = uuid::Uuid::new_v4().to_string();
        self.workers.lock().unwrap().insert(
            worker_id.clone(),
            WorkerMeta {
                hostname,
                last_heartbeat: SystemTime::now(),
                dead: false,
                max_concurrency: max_concurrency.max(1),
                tasks_started: 0,
                tasks_succeeded: 0,
                tasks_failed: 0,
            },
        );
        info!(
            "worker registrado: {} (max_concurrency={})",
            worker_id, max_concurrency
        );
        worker_id
    }

    pub fn heartbeat(&self, worker_id: &str) -> bool {
        let mut workers = self.workers.lock().unwrap();
        match workers.get_mut(worker_id) {
            Some(meta) => {
                meta.last_heartbeat = SystemTime::now();
                meta.dead = false;
                true
            }
            None => false,
        }
    }

    /// Siguiente tarea de la cola, si el worker tiene capacidad.
    pub fn assign_next(&self, worker_id: &str) -> Option<Task> {
        // 1) Capacidad del worker (desconocido o muerto: nada)
        let max_for_worker = {
            let workers = self.workers.lock().unwrap();
            match workers.get(worker_id) {
                Some(meta) if !meta.dead => meta.max_concurrency,
                _ => return None,
            }
        };

        let active_for_worker = {
            let in_flight = self.in_flight.lock().unwrap();
            in_flight
                .values()
                .filter(|entry| entry.worker_id == worker_id)
                .count() as u32
        };

        if active_for_worker >= max_for_worker {
            return None;
        }

        // 2) Sacar la siguiente tarea de la cola global
        let task = self.tasks_queue.lock().unwrap().pop_front()?;

        info!(
            "asignando tarea {} (job={}, index={}) al worker {}",
            task.id, task.job_id, task.task_index, worker_id
        );

        self.in_flight.lock().unwrap().insert(
            task.id.clone(),
            InFlight {
                task: task.clone(),
                worker_id: worker_id.to_string(),
                started_at: SystemTime::now(),
            },
        );

        // 3) Job a Running la primera vez
        {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs.get_mut(&task.job_id) {
                if job.status == JobStatus::Accepted {
                    job.status = JobStatus::Running;
                    job.started_at = Some(Utc::now());
                }
            }
        }

        if let Some(meta) = self.workers.lock().unwrap().get_mut(worker_id) {
            meta.tasks_started += 1;
        }

        Some(task)
    }

    /// Registra el fin de un intento. `false` si la tarea no estaba en vuelo
    /// o si el reporte es de un intento anterior al que está corriendo.
    pub fn complete_task(&self, task_id: &str, attempt: u32, success: bool) -> bool {
        let inflight = {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(task_id) {
                Some(entry) if entry.task.attempt == attempt => in_flight.remove(task_id),
                Some(entry) => {
                    warn!(
                        "ignorando reporte del intento {} de la tarea {} (en vuelo: intento {})",
                        attempt, task_id, entry.task.attempt
                    );
                    None
                }
                None => None,
            }
        };
        let Some(inflight) = inflight else {
            return false;
        };

        if let Some(meta) = self.workers.lock().unwrap().get_mut(&inflight.worker_id) {
            if success {
                meta.tasks_succeeded += 1;
            } else {
                meta.tasks_failed += 1;
            }
        }

        let task = inflight.task;
        if success {
            info!(
                "tarea {} (job={}, index={}) completada",
                task.id, task.job_id, task.task_index
            );
            if let Some(job) = self.jobs.lock().unwrap().get_mut(&task.job_id) {
                job.completed_tasks += 1;
            }
        } else {
            self.retry_or_fail(task);
        }

        self.finish_job_if_done();
        true
    }

    fn retry_or_fail(&self, mut task: Task) {
        if task.attempt + 1 < MAX_TASK_ATTEMPTS {
            task.attempt += 1;
            warn!(
                "tarea {} (job={}, index={}) falló, reintento {}",
                task.id, task.job_id, task.task_index, task.attempt
            );
            if let Some(job) = self.jobs.lock().unwrap().get_mut(&task.job_id) {
                job.retries += 1;
            }
            self.tasks_queue.lock().unwrap().push_back(task);
        } else {
            warn!(
                "tarea {} (job={}, index={}) agotó {} intentos",
                task.id, task.job_id, task.task_index, MAX_TASK_ATTEMPTS
            );
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs.get_mut(&task.job_id) {
                job.failed_tasks += 1;
            }
        }
    }

    fn finish_job_if_done(&self) {
        let mut jobs = self.jobs.lock().unwrap();
        let queue = self.tasks_queue.lock().unwrap();
        let in_flight = self.in_flight.lock().unwrap();

        for job in jobs.values_mut() {
            if job.status.is_terminal() {
                continue;
            }
            let settled = job.completed_tasks + job.failed_tasks;
            let pending = queue.iter().any(|t| t.job_id == job.id)
                || in_flight.values().any(|f| f.task.job_id == job.id);

            if settled == job.total_tasks && !pending {
                job.status = if job.failed_tasks > 0 {
                    JobStatus::Failed
                } else {
                    JobStatus::Succeeded
                };
                job.finished_at = Some(Utc::now());
                info!("job {} terminó: {:?}", job.id, job.status);
            }
        }
    }

    /// Marca como muertos a los workers sin heartbeat y reencola sus tareas.
    /// Devuelve los workers marcados en esta pasada.
    pub fn sweep_dead_workers(&self, now: SystemTime, timeout: Duration) -> HashSet<WorkerId> {
        let mut dead_workers: HashSet<WorkerId> = HashSet::new();
        {
            let mut workers = self.workers.lock().unwrap();
            for (id, meta) in workers.iter_mut() {
                if meta.dead {
                    continue;
                }
                if let Ok(elapsed) = now.duration_since(meta.last_heartbeat) {
                    if elapsed > timeout {
                        meta.dead = true;
                        warn!("marcando worker {} ({}) como muerto", id, meta.hostname);
                        dead_workers.insert(id.clone());
                    }
                }
            }
        }

        if dead_workers.is_empty() {
            return dead_workers;
        }

        let mut orphaned: Vec<Task> = Vec::new();
        self.in_flight.lock().unwrap().retain(|_task_id, inflight| {
            if dead_workers.contains(&inflight.worker_id) {
                orphaned.push(inflight.task.clone());
                false
            } else {
                true
            }
        });

        for task in orphaned {
            info!(
                "re-encolando tarea {} del job {} por worker muerto",
                task.id, task.job_id
            );
            self.retry_or_fail(task);
        }
        self.finish_job_if_done();

        dead_workers
    }
}
