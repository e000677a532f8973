use anyhow::Result;
use common::{
    Task, TaskAssignmentRequest, TaskAssignmentResponse, TaskCompleteRequest,
    WorkerHeartbeatRequest, WorkerId, WorkerRegisterRequest, WorkerRegisterResponse,
};
use reqwest::{Client, StatusCode};
use std::{env, sync::Arc, time::Duration};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{info, warn};

const DEFAULT_WORKER_CONCURRENCY: u32 = 2;

/// URL base del master.
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

/// Loop principal del worker.
/// - Se registra en el master.
/// - Hace heartbeats periódicos.
/// - Pide tareas mientras tenga "slots" libres.
/// - Ejecuta el comando de cada tarea con su environment (BATCH_TASK_INDEX incluido).
pub async fn run() -> Result<()> {
    let base_url = master_base_url();
    let client = Client::new();

    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let max_concurrency: u32 = env::var("WORKER_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(DEFAULT_WORKER_CONCURRENCY)
        .max(1);

    let mut worker_id = register(&client, &base_url, &hostname, max_concurrency).await?;

    let sem = Arc::new(Semaphore::new(max_concurrency as usize));

    loop {
        // --------- Heartbeat al master ---------
        let hb_url = format!("{}/api/v1/workers/heartbeat", base_url);
        match client
            .post(&hb_url)
            .json(&WorkerHeartbeatRequest {
                worker_id: worker_id.clone(),
            })
            .send()
            .await
        {
            Ok(resp) if must_reregister(resp.status()) => {
                // el master no nos conoce (p.ej. se reinició)
                warn!("el master no conoce al worker {}, re-registrando", worker_id);
                match register(&client, &base_url, &hostname, max_concurrency).await {
                    Ok(id) => worker_id = id,
                    Err(e) => {
                        warn!("re-registro falló: {:?}", e);
                        sleep(Duration::from_secs(2)).await;
                        continue;
                    }
                }
            }
            Ok(resp) if !resp.status().is_success() => {
                warn!("heartbeat respondió {}", resp.status());
            }
            Ok(_) => {}
            Err(e) => warn!("heartbeat falló: {:?}", e),
        }

        // --------- Control de concurrencia local ---------
        let permit = match sem.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                sleep(Duration::from_millis(500)).await;
                continue;
            }
        };

        // Pedimos tarea al master
        let assign_url = format!("{}/api/v1/tasks/next", base_url);
        let assignment: TaskAssignmentResponse = match client
            .post(&assign_url)
            .json(&TaskAssignmentRequest {
                worker_id: worker_id.clone(),
            })
            .send()
            .await
        {
            Ok(resp) => resp.json().await?,
            Err(e) => {
                warn!("no se pudo pedir tarea: {:?}", e);
                drop(permit);
                sleep(Duration::from_secs(2)).await;
                continue;
            }
        };

        let Some(task) = assignment.task else {
            // No hay tarea: devolvemos el permiso y dormimos
            drop(permit);
            sleep(Duration::from_secs(2)).await;
            continue;
        };

        info!(
            "tengo tarea {} del job {} (index={}, intento={})",
            task.id, task.job_id, task.task_index, task.attempt
        );

        let client_cloned = client.clone();
        let base_url_cloned = base_url.clone();

        tokio::spawn(async move {
            let success = match run_task(&task).await {
                Ok(ok) => ok,
                Err(e) => {
                    warn!("no se pudo lanzar la tarea {}: {:?}", task.id, e);
                    false
                }
            };

            // Reportar al master que terminamos
            let complete_url = format!("{}/api/v1/tasks/complete", base_url_cloned);
            if let Err(e) = client_cloned
                .post(&complete_url)
                .json(&TaskCompleteRequest {
                    task_id: task.id.clone(),
                    attempt: task.attempt,
                    success,
                })
                .send()
                .await
            {
                warn!("no se pudo reportar la tarea {}: {:?}", task.id, e);
            }

            // Liberar el "slot" de concurrencia al terminar
            drop(permit);
        });
    }
}

/// Registra el worker (enviando max_concurrency) y devuelve su id.
async fn register(
    client: &Client,
    base_url: &str,
    hostname: &str,
    max_concurrency: u32,
) -> Result<WorkerId> {
    let register_url = format!("{}/api/v1/workers/register", base_url);
    let res = client
        .post(&register_url)
        .json(&WorkerRegisterRequest {
            hostname: hostname.to_string(),
            max_concurrency,
        })
        .send()
        .await?
        .error_for_status()?;
    let WorkerRegisterResponse { worker_id } = res.json().await?;

    info!(
        "worker {} registrado con concurrency={} contra {}",
        worker_id, max_concurrency, base_url
    );
    Ok(worker_id)
}

/// Un 404 al heartbeat quiere decir que el master perdió el registro.
fn must_reregister(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND
}

/// Corre el comando de la tarea con `sh -c` y el environment del slot.
/// `Ok(false)` si el comando terminó con código distinto de 0.
pub async fn run_task(task: &Task) -> Result<bool> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(&task.command)
        .envs(&task.environment)
        .status()
        .await?;

    if status.success() {
        info!("terminé tarea {} (index={}) correctamente", task.id, task.task_index);
    } else {
        warn!(
            "tarea {} (index={}) terminó con {}",
            task.id, task.task_index, status
        );
    }
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::contract::TASK_INDEX_ENV;
    use std::collections::BTreeMap;

    fn task(command: &str, task_index: u32) -> Task {
        let mut environment = BTreeMap::new();
        environment.insert(TASK_INDEX_ENV.to_string(), task_index.to_string());
        Task {
            id: "t-1".to_string(),
            job_id: "j-1".to_string(),
            task_index,
            attempt: 0,
            command: command.to_string(),
            environment,
        }
    }

    #[tokio::test]
    async fn run_task_pasa_el_indice_por_environment() {
        let t = task("test \"$BATCH_TASK_INDEX\" = 2", 2);
        assert!(run_task(&t).await.unwrap());

        let t = task("test \"$BATCH_TASK_INDEX\" = 2", 5);
        assert!(!run_task(&t).await.unwrap());
    }

    #[test]
    fn heartbeat_404_fuerza_re_registro() {
        assert!(must_reregister(StatusCode::NOT_FOUND));
        assert!(!must_reregister(StatusCode::OK));
        assert!(!must_reregister(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn run_task_codigo_distinto_de_cero_es_falla() {
        let t = task("exit 3", 0);
        assert!(!run_task(&t).await.unwrap());
    }
}
