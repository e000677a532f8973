use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunk::{ChunkWriter, LocalChunk};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::store::ChunkStore;
use crate::upload::{ChunkUploader, UploadReport};

/// Resultado de un split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutcome {
    /// Chunks producidos (no los subidos con éxito: eso está en `uploads`).
    pub total_chunks: usize,
    pub total_rows: usize,
    pub chunks: Vec<LocalChunk>,
    pub uploads: UploadReport,
}

/// Escribe los chunks en local y después los sube todos.
pub struct Splitter {
    config: PipelineConfig,
    store: Arc<dyn ChunkStore>,
}

impl Splitter {
    pub fn new(config: PipelineConfig, store: Arc<dyn ChunkStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parte `input` en chunks de `config.chunk_size` filas bajo `output_dir`
    /// y los sube al store. Un error de IO corta todo; las fallas de upload
    /// quedan en `SplitOutcome::uploads` y el que llama decide.
    pub async fn split(&self, input: &Path, output_dir: &Path) -> Result<SplitOutcome> {
        let chunk_size = self.config.chunk_size;
        let writer = ChunkWriter::new(output_dir, chunk_size)?;
        let input_owned = input.to_path_buf();

        let chunks = tokio::task::spawn_blocking(move || write_input_chunks(&input_owned, &writer))
            .await
            .map_err(|e| PipelineError::io(input, std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        let total_chunks = chunks.len();
        let total_rows: usize = chunks.iter().map(|c| c.rows).sum();
        info!(
            "{} dividido en {} chunks ({} filas, chunk_size={})",
            input.display(),
            total_chunks,
            total_rows,
            chunk_size
        );

        let uploader = ChunkUploader::new(
            self.store.clone(),
            self.config.dataset_name.clone(),
            self.config.upload_concurrency,
        );
        let uploads = uploader.upload(&chunks).await;

        let failed = uploads.failed();
        if failed.is_empty() {
            info!(
                "{} chunks subidos a {} bajo {}/",
                total_chunks,
                self.store.name(),
                self.config.dataset_name
            );
        } else {
            warn!(
                "{} de {} chunks NO se subieron a {}: {:?}",
                failed.len(),
                total_chunks,
                self.store.name(),
                failed
            );
        }

        Ok(SplitOutcome {
            total_chunks,
            total_rows,
            chunks,
            uploads,
        })
    }
}

fn write_input_chunks(input: &Path, writer: &ChunkWriter) -> Result<Vec<LocalChunk>> {
    let file = File::open(input).map_err(|e| PipelineError::io(input, e))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let header = reader.headers()?.clone();
    let rows = reader
        .into_records()
        .map(|r| r.map_err(PipelineError::from));

    writer.write(&header, rows)
}

/// `demo/large_data.csv` -> `demo/large_data_chunks`
pub fn default_output_dir(input: &Path) -> PathBuf {
    let stem = dataset_name_for(input);
    input.with_file_name(format!("{}_chunks", stem))
}

/// `demo/large_data.csv` -> `large_data`
pub fn dataset_name_for(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string())
}
