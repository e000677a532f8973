mod worker;

use std::env;

use anyhow::{Context, Result};
use common::{build_store, ChunkProcessor, TaskEnvironment};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("worker=debug,common=debug,reqwest=info")),
        )
        .init();

    match env::args().nth(1).as_deref() {
        // Una sola tarea: el chunk sale de BATCH_TASK_INDEX
        Some("process-chunk") => process_chunk().await,
        Some(other) => anyhow::bail!("subcomando desconocido: {other} (usar process-chunk o nada)"),
        None => worker::run().await,
    }
}

async fn process_chunk() -> Result<()> {
    let task_env = TaskEnvironment::from_lookup(|k| env::var(k).ok())
        .context("environment de la tarea inválido")?;
    info!(
        "procesando tarea {} del dataset {} en {}",
        task_env.task_index,
        task_env.dataset_name,
        task_env.storage.to_env_value()
    );

    let store = build_store(&task_env.storage)?;
    let processor = ChunkProcessor::new(store, task_env.dataset_name);
    let done = processor.process(task_env.task_index).await?;

    info!(
        "chunk {} procesado ({} filas) -> {}",
        done.chunk_index, done.rows, done.output_key
    );
    Ok(())
}
