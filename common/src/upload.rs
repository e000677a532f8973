use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::chunk::LocalChunk;
use crate::contract::chunk_key;
use crate::error::{PipelineError, Result};
use crate::store::ChunkStore;

/// Resultado del upload de un chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkUpload {
    pub index: usize,
    pub key: String,
    /// `None` si subió bien, `Some(mensaje)` si falló.
    pub error: Option<String>,
}

impl ChunkUpload {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Una entrada por chunk, ordenadas por índice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub uploads: Vec<ChunkUpload>,
}

impl UploadReport {
    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    pub fn failed(&self) -> Vec<usize> {
        self.uploads
            .iter()
            .filter(|u| !u.succeeded())
            .map(|u| u.index)
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.uploads.iter().all(ChunkUpload::succeeded)
    }

    /// Convierte fallas parciales en error, para quien no las tolera.
    pub fn into_result(self) -> Result<Self> {
        let failed = self.failed();
        if failed.is_empty() {
            Ok(self)
        } else {
            Err(PipelineError::Upload {
                failed,
                total: self.uploads.len(),
            })
        }
    }
}

/// Sube chunks al store en paralelo, con un máximo de `concurrency` a la vez.
pub struct ChunkUploader {
    store: Arc<dyn ChunkStore>,
    dataset_name: String,
    concurrency: usize,
}

impl ChunkUploader {
    pub fn new(store: Arc<dyn ChunkStore>, dataset_name: impl Into<String>, concurrency: usize) -> Self {
        Self {
            store,
            dataset_name: dataset_name.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Lanza un upload por chunk y espera a todos antes de volver.
    /// La falla de uno no cancela a los demás; el reporte tiene siempre
    /// una entrada por chunk recibido.
    pub async fn upload(&self, chunks: &[LocalChunk]) -> UploadReport {
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<ChunkUpload> = JoinSet::new();

        for chunk in chunks {
            let store = self.store.clone();
            let sem = sem.clone();
            let index = chunk.index;
            let path = chunk.path.clone();
            let key = chunk_key(&self.dataset_name, index);

            join_set.spawn(async move {
                let error = match sem.acquire_owned().await {
                    Ok(_permit) => upload_one(store.as_ref(), &path, &key)
                        .await
                        .err()
                        .map(|e| e.to_string()),
                    Err(e) => Some(format!("semáforo cerrado: {e}")),
                };
                ChunkUpload { index, key, error }
            });
        }

        let mut uploads: Vec<ChunkUpload> = Vec::with_capacity(chunks.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(upload) => {
                    match &upload.error {
                        None => debug!("chunk {} subido a {}", upload.index, upload.key),
                        Some(e) => warn!("falló upload del chunk {} ({}): {}", upload.index, upload.key, e),
                    }
                    uploads.push(upload);
                }
                Err(e) => warn!("join error en upload: {:?}", e),
            }
        }

        // Un panic dentro de la tarea no debe dejar al chunk fuera del reporte
        for chunk in chunks {
            if !uploads.iter().any(|u| u.index == chunk.index) {
                uploads.push(ChunkUpload {
                    index: chunk.index,
                    key: chunk_key(&self.dataset_name, chunk.index),
                    error: Some("la tarea de upload terminó sin resultado".to_string()),
                });
            }
        }

        uploads.sort_by_key(|u| u.index);
        UploadReport { uploads }
    }
}

async fn upload_one(store: &dyn ChunkStore, path: &Path, key: &str) -> Result<()> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::io(path, e))?;
    store.put(key, data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectChunkStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::path::PathBuf;
    use std::{env, fs};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir()
            .join("uploader_tests")
            .join(format!("{}-{}", sub, std::process::id()));
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn local_chunks(dir: &PathBuf, n: usize) -> Vec<LocalChunk> {
        (1..=n)
            .map(|i| {
                let path = dir.join(format!("chunk_{}.csv", i));
                fs::write(&path, format!("number_1\n{}\n", i)).unwrap();
                LocalChunk {
                    index: i,
                    path,
                    rows: 1,
                }
            })
            .collect()
    }

    /// Store en memoria que falla para las keys indicadas y cuenta intentos.
    #[derive(Default)]
    struct FlakyStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        fail_keys: Vec<String>,
        attempts: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ChunkStore for FlakyStore {
        async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_keys.iter().any(|k| k == key) {
                return Err(PipelineError::store(key, "simulado"));
            }
            self.objects.lock().unwrap().insert(key.to_string(), data);
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| PipelineError::store(key, "no existe"))
        }

        fn name(&self) -> String {
            "flaky".to_string()
        }
    }

    #[tokio::test]
    async fn una_falla_no_afecta_a_los_demas() {
        let dir = temp_dir("una_falla");
        let chunks = local_chunks(&dir, 5);
        let store = Arc::new(FlakyStore {
            fail_keys: vec!["ds/chunk_3.csv".to_string()],
            ..Default::default()
        });

        let uploader = ChunkUploader::new(store.clone(), "ds", 4);
        let report = uploader.upload(&chunks).await;

        assert_eq!(store.attempts.load(Ordering::SeqCst), 5);
        assert_eq!(report.len(), 5);
        assert_eq!(report.failed(), vec![3]);
        assert_eq!(report.uploads.iter().filter(|u| u.succeeded()).count(), 4);
        assert!(store.get("ds/chunk_5.csv").await.is_ok());
        assert!(matches!(
            report.into_result(),
            Err(PipelineError::Upload { ref failed, total: 5 }) if failed == &vec![3]
        ));
    }

    #[tokio::test]
    async fn uploads_corren_en_paralelo_con_limite() {
        let dir = temp_dir("paralelo");
        let chunks = local_chunks(&dir, 12);
        let store = Arc::new(FlakyStore::default());

        let uploader = ChunkUploader::new(store.clone(), "ds", 3);
        let report = uploader.upload(&chunks).await;

        assert!(report.all_succeeded());
        let max = store.max_in_flight.load(Ordering::SeqCst);
        assert!(max > 1, "los uploads se serializaron");
        assert!(max <= 3, "se superó el límite de concurrencia: {max}");
    }

    #[tokio::test]
    async fn reporte_ordenado_por_indice_con_keys_deterministas() {
        let dir = temp_dir("orden");
        let chunks = local_chunks(&dir, 6);
        let store = Arc::new(ObjectChunkStore::in_memory());

        let report = ChunkUploader::new(store, "large_data", 6)
            .upload(&chunks)
            .await;

        let keys: Vec<String> = report.uploads.iter().map(|u| u.key.clone()).collect();
        let expected: Vec<String> = (1..=6).map(|i| format!("large_data/chunk_{}.csv", i)).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn resubir_sobreescribe_sin_duplicar() {
        let dir = temp_dir("idempotente");
        let chunks = local_chunks(&dir, 3);
        let store = Arc::new(FlakyStore::default());
        let uploader = ChunkUploader::new(store.clone(), "ds", 2);

        uploader.upload(&chunks).await;
        fs::write(&chunks[0].path, "number_1\nnuevo\n").unwrap();
        let report = uploader.upload(&chunks).await;

        assert!(report.all_succeeded());
        assert_eq!(store.objects.lock().unwrap().len(), 3);
        assert_eq!(
            store.get("ds/chunk_1.csv").await.unwrap(),
            b"number_1\nnuevo\n".to_vec()
        );
    }

    #[tokio::test]
    async fn archivo_local_faltante_queda_como_falla() {
        let dir = temp_dir("falta_archivo");
        let mut chunks = local_chunks(&dir, 2);
        chunks[1].path = dir.join("no_existe.csv");

        let report = ChunkUploader::new(Arc::new(ObjectChunkStore::in_memory()), "ds", 2)
            .upload(&chunks)
            .await;

        assert_eq!(report.failed(), vec![2]);
    }

    #[tokio::test]
    async fn sin_chunks_el_reporte_esta_vacio() {
        let report = ChunkUploader::new(Arc::new(ObjectChunkStore::in_memory()), "ds", 2)
            .upload(&[])
            .await;
        assert!(report.is_empty());
        assert!(report.all_succeeded());
    }
}
