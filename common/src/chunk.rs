use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::chunk_file_name;
use crate::error::{PipelineError, Result};

/// Una fila de datos. Los nombres de columna los da el [`Header`].
pub type Row = StringRecord;

/// Encabezado compartido por el input y todos los chunks.
pub type Header = StringRecord;

/// Chunk ya escrito en disco local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalChunk {
    /// Índice 1-based, en orden de input.
    pub index: usize,
    pub path: PathBuf,
    /// Filas de datos (sin contar el header).
    pub rows: usize,
}

/// Parte una secuencia de filas en archivos de a lo sumo `chunk_size` filas.
#[derive(Debug, Clone)]
pub struct ChunkWriter {
    output_dir: PathBuf,
    chunk_size: usize,
}

impl ChunkWriter {
    pub fn new(output_dir: impl Into<PathBuf>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(PipelineError::InvalidParameter(
                "chunk_size debe ser > 0".to_string(),
            ));
        }
        Ok(Self {
            output_dir: output_dir.into(),
            chunk_size,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Consume `rows` de forma perezosa: nunca tiene más de `chunk_size`
    /// filas en memoria. Devuelve los chunks en orden de índice.
    ///
    /// Si algo falla, el chunk a medio escribir se borra y no aparece en el
    /// resultado.
    pub fn write<I>(&self, header: &Header, rows: I) -> Result<Vec<LocalChunk>>
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| PipelineError::io(&self.output_dir, e))?;

        let mut chunks = Vec::new();
        let mut buffer: Vec<Row> = Vec::with_capacity(self.chunk_size);

        for row in rows {
            buffer.push(row?);

            if buffer.len() >= self.chunk_size {
                let chunk = self.flush(chunks.len() + 1, header, &buffer)?;
                chunks.push(chunk);
                buffer.clear();
            }
        }

        // Último chunk parcial
        if !buffer.is_empty() {
            let chunk = self.flush(chunks.len() + 1, header, &buffer)?;
            chunks.push(chunk);
        }

        Ok(chunks)
    }

    fn flush(&self, index: usize, header: &Header, rows: &[Row]) -> Result<LocalChunk> {
        let path = self.output_dir.join(chunk_file_name(index));
        let tmp_path = path.with_extension("csv.part");

        if let Err(e) = write_chunk_file(&tmp_path, header, rows) {
            let _ = fs::remove_file(&tmp_path);
            return Err(PipelineError::io(&tmp_path, e));
        }

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            PipelineError::io(&path, e)
        })?;

        debug!("chunk {} escrito en {} ({} filas)", index, path.display(), rows.len());

        Ok(LocalChunk {
            index,
            path,
            rows: rows.len(),
        })
    }
}

fn write_chunk_file(path: &Path, header: &Header, rows: &[Row]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));

    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }

    let mut inner = writer
        .into_inner()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    inner.flush()?;
    inner.get_ref().sync_all()?;
    Ok(())
}
