use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::config::MismatchPolicy;
use common::split::{dataset_name_for, default_output_dir};
use common::synthetic::generate_csv;
use common::{build_store, PipelineConfig, SplitOutcome, Splitter, TaskDispatcher};
use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::remote::HttpExecutionService;

/// Comando que corre cada tarea remota por defecto.
const DEFAULT_TASK_COMMAND: &str = "worker process-chunk";

/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Divide un CSV en chunks, los sube y lanza una tarea por chunk")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Genera un CSV de prueba (number_1, number_2, number_3)
    Generate {
        #[arg(long, default_value = "demo/large_data.csv")]
        output: PathBuf,

        #[arg(long, default_value_t = 1_000_000)]
        rows: usize,
    },

    /// Divide el CSV en chunks y los sube al store
    Split {
        #[arg(value_name = "INPUT_CSV")]
        input: PathBuf,

        /// Filas por chunk (default: CHUNK_SIZE o 10000)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Directorio local de chunks (default: <input>_chunks)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Lanza un job con una tarea por chunk ya subido
    Dispatch {
        /// Cantidad de chunks que produjo el split
        #[arg(long)]
        total_chunks: usize,

        /// Tareas a lanzar (default: total_chunks)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Dataset bajo el que se subieron los chunks (default: DATASET_NAME)
        #[arg(long)]
        dataset: Option<String>,

        #[arg(long)]
        job_name: Option<String>,

        #[arg(long, default_value = DEFAULT_TASK_COMMAND)]
        command: String,

        /// Rechazar si parallelism < total_chunks en vez de avisar
        #[arg(long)]
        strict: bool,
    },

    /// split + dispatch
    Run {
        #[arg(value_name = "INPUT_CSV")]
        input: PathBuf,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Tareas a lanzar (default: cantidad de chunks)
        #[arg(long)]
        parallelism: Option<usize>,

        #[arg(long)]
        job_name: Option<String>,

        #[arg(long, default_value = DEFAULT_TASK_COMMAND)]
        command: String,

        #[arg(long)]
        strict: bool,
    },

    /// Consulta el estado de un job
    Status {
        #[arg(value_name = "JOB_ID")]
        id: String,
    },
}

fn default_job_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("chunk-job-{}", &id[..8])
}

fn load_config(dataset: &str, chunk_size: Option<usize>, strict: bool) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env(dataset)?;
    if let Some(size) = chunk_size {
        config.chunk_size = size;
    }
    if strict {
        config.mismatch_policy = MismatchPolicy::Reject;
    }
    config.validate()?;
    Ok(config)
}

async fn split(
    config: &PipelineConfig,
    input: &Path,
    output_dir: Option<PathBuf>,
) -> Result<SplitOutcome> {
    let store = build_store(&config.storage)?;
    let output_dir = output_dir.unwrap_or_else(|| default_output_dir(input));
    let splitter = Splitter::new(config.clone(), store)?;

    let outcome = splitter
        .split(input, &output_dir)
        .await
        .with_context(|| format!("no se pudo dividir {}", input.display()))?;

    println!("El archivo se dividió en {} chunks.", outcome.total_chunks);
    println!("  filas          : {}", outcome.total_rows);
    println!("  chunks locales : {}", output_dir.display());
    println!(
        "  store          : {} ({}/)",
        config.storage.to_env_value(),
        config.dataset_name
    );
    let failed = outcome.uploads.failed();
    if !failed.is_empty() {
        println!("  uploads fallidos: {:?}", failed);
        for u in outcome.uploads.uploads.iter().filter(|u| !u.succeeded()) {
            println!("    - {}: {}", u.key, u.error.as_deref().unwrap_or(""));
        }
    }
    Ok(outcome)
}

async fn dispatch(
    config: PipelineConfig,
    total_chunks: usize,
    parallelism: Option<usize>,
    job_name: Option<String>,
    command: &str,
) -> Result<()> {
    let parallelism = parallelism.unwrap_or(total_chunks);
    let job_name = job_name.unwrap_or_else(default_job_name);

    let service = Arc::new(HttpExecutionService::new(master_base_url()));
    let dispatcher = TaskDispatcher::new(config, service);
    let job = dispatcher
        .dispatch(&job_name, parallelism, total_chunks, command)
        .await?;

    println!("Job creado:");
    println!("  id          : {}", job.handle.job_id);
    println!("  nombre      : {}", job.handle.name);
    println!("  parallelism : {}", job.handle.parallelism);
    if let Some(range) = job.unprocessed_chunks {
        println!(
            "  ATENCIÓN: chunks {}..={} no tienen tarea",
            range.start(),
            range.end()
        );
    }
    Ok(())
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { output, rows } => {
            generate_csv(&output, rows)?;
            println!("CSV generado: {} ({} filas)", output.display(), rows);
        }

        Commands::Split {
            input,
            chunk_size,
            output_dir,
        } => {
            let config = load_config(&dataset_name_for(&input), chunk_size, false)?;
            let outcome = split(&config, &input, output_dir).await?;
            // Éxito parcial no pasa desapercibido: exit code != 0
            outcome.uploads.into_result()?;
        }

        Commands::Dispatch {
            total_chunks,
            parallelism,
            dataset,
            job_name,
            command,
            strict,
        } => {
            let config = load_config(dataset.as_deref().unwrap_or(""), None, strict)?;
            dispatch(config, total_chunks, parallelism, job_name, &command).await?;
        }

        Commands::Run {
            input,
            chunk_size,
            output_dir,
            parallelism,
            job_name,
            command,
            strict,
        } => {
            let config = load_config(&dataset_name_for(&input), chunk_size, strict)?;
            let outcome = split(&config, &input, output_dir).await?;

            // No se despacha sobre un set de chunks incompleto
            outcome.uploads.into_result()?;
            if outcome.total_chunks == 0 {
                println!("El input no tiene filas; no se lanza ningún job.");
                return Ok(());
            }

            dispatch(config, outcome.total_chunks, parallelism, job_name, &command).await?;
        }

        Commands::Status { id } => {
            let service = HttpExecutionService::new(master_base_url());
            match service.job(&id).await? {
                Some(job) => {
                    println!("Job:");
                    println!("  id: {}", job.id);
                    println!("  nombre: {}", job.name);
                    println!("  región: {}", job.region);
                    println!("  estado: {:?}", job.status);
                    println!(
                        "  tareas: total={}, completadas={}, fallidas={}, reintentos={}",
                        job.total_tasks, job.completed_tasks, job.failed_tasks, job.retries
                    );

                    let done = job.completed_tasks + job.failed_tasks;
                    if job.total_tasks > 0 {
                        let pct = (done as f64 / job.total_tasks as f64) * 100.0;
                        println!("  progreso: {:.1}%", pct);
                    }

                    println!("  submitted_at: {}", job.submitted_at);
                    if let Some(ref started) = job.started_at {
                        println!("  iniciado: {}", started);
                    }
                    if let Some(ref done) = job.finished_at {
                        println!("  finalizado: {}", done);
                    }
                }
                None => bail!("job {id} no encontrado"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_es_consistente() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dispatch_parallelism_es_opcional() {
        let cli = Cli::try_parse_from(["client", "dispatch", "--total-chunks", "100"]).unwrap();
        match cli.command {
            Commands::Dispatch {
                total_chunks,
                parallelism,
                command,
                strict,
                ..
            } => {
                assert_eq!(total_chunks, 100);
                assert_eq!(parallelism, None);
                assert_eq!(command, DEFAULT_TASK_COMMAND);
                assert!(!strict);
            }
            _ => panic!("se esperaba dispatch"),
        }
    }

    #[test]
    fn default_job_name_tiene_prefijo() {
        let name = default_job_name();
        assert!(name.starts_with("chunk-job-"));
        assert_eq!(name.len(), "chunk-job-".len() + 8);
    }
}
