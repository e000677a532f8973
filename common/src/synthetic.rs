use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use rand::Rng;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::process::INPUT_COLUMNS;

/// Genera un CSV de prueba con `rows` filas de 3 enteros entre 1 y 100.
pub fn generate_csv(path: &Path, rows: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
    }

    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    writer.write_record(INPUT_COLUMNS)?;

    let mut rng = rand::thread_rng();
    for _ in 0..rows {
        let row: [u32; 3] = [
            rng.gen_range(1..=100),
            rng.gen_range(1..=100),
            rng.gen_range(1..=100),
        ];
        writer.write_record(row.iter().map(|n| n.to_string()))?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;

    info!("CSV '{}' generado con {} filas", path.display(), rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn generate_csv_escribe_header_y_filas() {
        let path = env::temp_dir()
            .join("synthetic_tests")
            .join(format!("gen-{}", std::process::id()))
            .join("large_data.csv");
        let _ = fs::remove_file(&path);

        generate_csv(&path, 50).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        assert_eq!(
            rdr.headers().unwrap(),
            &csv::StringRecord::from(vec!["number_1", "number_2", "number_3"])
        );
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 50);
        for r in rows {
            for field in r.iter() {
                let n: u32 = field.parse().unwrap();
                assert!((1..=100).contains(&n));
            }
        }
    }
}
