use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};

use crate::types::{Sample, Window, AXES};

/// Cabecera de los CSV de ventanas grabadas
pub const CSV_HEADER: [&str; AXES] = ["ax", "ay", "az", "gx", "gy", "gz"];

/// Carga una ventana cruda desde un CSV con cabecera ax,ay,az,gx,gy,gz,
/// una fila por muestra en orden de llegada.
pub fn load_window_from_csv(path: impl AsRef<Path>) -> Result<Window> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut samples = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Fila {} inválida en {:?}", row_idx + 1, path))?;
        if record.len() != AXES {
            bail!(
                "La fila {} tiene {} columnas, se esperaban {}",
                row_idx + 1,
                record.len(),
                AXES
            );
        }

        let mut values = [0.0f32; AXES];
        for (axis, field) in record.iter().enumerate() {
            values[axis] = field.parse().with_context(|| {
                format!("{} inválido en fila {}: {:?}", CSV_HEADER[axis], row_idx + 1, field)
            })?;
        }
        samples.push(Sample::from_array(values));
    }

    Window::new(samples).with_context(|| format!("El CSV {:?} no contiene datos", path))
}

/// Escribe una ventana en formato CSV
pub fn write_window_csv(path: impl AsRef<Path>, window: &Window) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("No se pudo crear {:?}", path))?;

    writer.write_record(CSV_HEADER)?;
    for row in window.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Graba cada ventana capturada como `<prefijo>_<n>.csv` en un directorio
#[derive(Debug)]
pub struct WindowRecorder {
    dir: PathBuf,
    prefix: String,
    next_idx: usize,
}

impl WindowRecorder {
    /// Crea el directorio si no existe y continúa la numeración existente
    pub fn new(dir: impl Into<PathBuf>, prefix: &str) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("No se pudo crear {:?}", dir))?;

        let next_idx = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let idx = name
                    .strip_prefix(prefix)?
                    .strip_prefix('_')?
                    .strip_suffix(".csv")?;
                idx.parse::<usize>().ok()
            })
            .max()
            .map_or(0, |idx| idx + 1);

        Ok(Self {
            dir,
            prefix: prefix.to_string(),
            next_idx,
        })
    }

    pub fn record(&mut self, window: &Window) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("{}_{:04}.csv", self.prefix, self.next_idx));
        write_window_csv(&path, window)?;
        self.next_idx += 1;
        log::info!("💾 Ventana guardada en {:?}", path);
        Ok(path)
    }
}
