use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::info;

use crate::config::StorageConfig;
use crate::error::{PipelineError, Result};

/// Store durable direccionado por key. `put` sobreescribe si la key existe.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Nombre legible para logs (bucket, ruta, etc).
    fn name(&self) -> String;
}

/// Adaptador de cualquier `ObjectStore` (GCS, disco local, memoria).
#[derive(Debug, Clone)]
pub struct ObjectChunkStore {
    inner: Arc<dyn ObjectStore>,
    name: String,
}

impl ObjectChunkStore {
    pub fn new(inner: Arc<dyn ObjectStore>, name: impl Into<String>) -> Self {
        Self {
            inner,
            name: name.into(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory://")
    }
}

#[async_trait]
impl ChunkStore for ObjectChunkStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let location = ObjectPath::from(key);
        self.inner
            .put(&location, PutPayload::from(data))
            .await
            .map_err(|e| PipelineError::store(key, e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let location = ObjectPath::from(key);
        let result = self
            .inner
            .get(&location)
            .await
            .map_err(|e| PipelineError::store(key, e))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| PipelineError::store(key, e))?;
        Ok(bytes.to_vec())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Construye el store según la configuración.
/// Para GCS las credenciales salen del entorno (`GOOGLE_APPLICATION_CREDENTIALS`, etc).
pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn ChunkStore>> {
    let store: ObjectChunkStore = match config {
        StorageConfig::Local { root } => {
            fs::create_dir_all(root).map_err(|e| PipelineError::io(root, e))?;
            let local = LocalFileSystem::new_with_prefix(root)
                .map_err(|e| PipelineError::Config(e.to_string()))?;
            ObjectChunkStore::new(Arc::new(local), config.to_env_value())
        }
        StorageConfig::Gcs { bucket } => {
            let gcs = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| PipelineError::Config(e.to_string()))?;
            ObjectChunkStore::new(Arc::new(gcs), config.to_env_value())
        }
        StorageConfig::Memory => ObjectChunkStore::in_memory(),
    };

    info!("store de chunks: {}", store.name());
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, path::PathBuf};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir()
            .join("store_tests")
            .join(format!("{}-{}", sub, std::process::id()));
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    #[tokio::test]
    async fn put_sobreescribe_la_misma_key() {
        let store = ObjectChunkStore::in_memory();
        store.put("ds/chunk_1.csv", b"a".to_vec()).await.unwrap();
        store.put("ds/chunk_1.csv", b"b".to_vec()).await.unwrap();

        assert_eq!(store.get("ds/chunk_1.csv").await.unwrap(), b"b".to_vec());
    }

    #[tokio::test]
    async fn get_de_key_inexistente_es_error_de_store() {
        let store = ObjectChunkStore::in_memory();
        let err = store.get("ds/chunk_9.csv").await.unwrap_err();
        assert!(matches!(err, PipelineError::Store { .. }));
    }

    #[tokio::test]
    async fn build_store_local_escribe_bajo_la_raiz() {
        let root = temp_dir("local_root");
        let store = build_store(&StorageConfig::Local { root: root.clone() }).unwrap();

        store
            .put("ds/chunk_2.csv", b"number_1\n1\n".to_vec())
            .await
            .unwrap();

        let on_disk = fs::read_to_string(root.join("ds").join("chunk_2.csv")).unwrap();
        assert_eq!(on_disk, "number_1\n1\n");
    }
}
