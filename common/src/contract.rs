//! Contrato compartido entre el dispatcher y el procesador de chunks.
//!
//! El scheduler remoto numera las tareas desde 0 y los chunks se numeran
//! desde 1. Ambos lados resuelven el chunk de una tarea SOLO con estas
//! funciones; si cambia la política de índices hay que subir
//! `CHUNK_CONTRACT_VERSION`.

/// Versión del contrato tarea -> chunk. Viaja en el environment del job.
pub const CHUNK_CONTRACT_VERSION: u32 = 1;

/// Variable de entorno con el índice (0-based) que el scheduler da a cada tarea.
pub const TASK_INDEX_ENV: &str = "BATCH_TASK_INDEX";
/// Cantidad de tareas del job, también puesta por el scheduler.
pub const TASK_COUNT_ENV: &str = "BATCH_TASK_COUNT";

pub const DATASET_NAME_ENV: &str = "DATASET_NAME";
pub const TOTAL_CHUNKS_ENV: &str = "TOTAL_CHUNKS";
pub const CONTRACT_VERSION_ENV: &str = "CHUNK_CONTRACT_VERSION";
/// Store donde viven los chunks (`gs://bucket`, `file:///ruta`).
pub const STORAGE_ENV: &str = "STORAGE_URL";

/// Tarea `t` procesa el chunk `t + 1`.
pub fn chunk_index_of(task_index: usize) -> usize {
    task_index + 1
}

/// Inversa de [`chunk_index_of`]. `None` para 0, que no es un chunk válido.
pub fn task_index_of(chunk_index: usize) -> Option<usize> {
    chunk_index.checked_sub(1)
}

pub fn chunk_file_name(chunk_index: usize) -> String {
    format!("chunk_{}.csv", chunk_index)
}

/// Key remota del chunk: `{dataset}/chunk_{i}.csv`.
pub fn chunk_key(dataset_name: &str, chunk_index: usize) -> String {
    format!("{}/{}", dataset_name, chunk_file_name(chunk_index))
}

/// Key del resultado: `{dataset}/processed/chunk_{i}_processed.csv`.
pub fn processed_key(dataset_name: &str, chunk_index: usize) -> String {
    format!(
        "{}/processed/chunk_{}_processed.csv",
        dataset_name, chunk_index
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn chunk_index_of_suma_uno() {
        assert_eq!(chunk_index_of(0), 1);
        assert_eq!(chunk_index_of(41), 42);
    }

    #[test]
    fn task_index_of_es_inversa() {
        for t in 0..100 {
            assert_eq!(task_index_of(chunk_index_of(t)), Some(t));
        }
        assert_eq!(task_index_of(0), None);
    }

    #[test]
    fn chunk_key_sigue_el_esquema() {
        assert_eq!(chunk_key("large_data", 3), "large_data/chunk_3.csv");
        assert_eq!(
            processed_key("large_data", 3),
            "large_data/processed/chunk_3_processed.csv"
        );
    }

    #[test]
    fn chunk_key_es_inyectiva_y_reproducible() {
        let keys: HashSet<String> = (1..=1000).map(|i| chunk_key("ds", i)).collect();
        assert_eq!(keys.len(), 1000);

        // misma entrada -> misma key, sin listar nada
        assert_eq!(chunk_key("ds", 10), chunk_key("ds", 10));
        // chunk_1 no debe ser prefijo ambiguo de chunk_10
        assert_ne!(chunk_key("ds", 1), chunk_key("ds", 10));
    }
}
