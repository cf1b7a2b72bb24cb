use serde::{Deserialize, Serialize};
use std::fmt;

/// Ejes por muestra: [ax, ay, az, gx, gy, gz]
pub const AXES: usize = 6;

/// Filas del vector de características con el que se entrenó el modelo
pub const DEFAULT_ROWS: usize = 500;

/// Duración de la ventana de captura de un gesto (segundos)
pub const DEFAULT_WINDOW_SECS: f32 = 5.0;

/// Una lectura IMU: aceleración (x, y, z) y velocidad angular (x, y, z)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
}

impl Sample {
    pub fn new(ax: f32, ay: f32, az: f32, gx: f32, gy: f32, gz: f32) -> Self {
        Self { ax, ay, az, gx, gy, gz }
    }

    pub fn from_array(values: [f32; AXES]) -> Self {
        let [ax, ay, az, gx, gy, gz] = values;
        Self::new(ax, ay, az, gx, gy, gz)
    }

    /// Orden fijo de ejes: acelerómetro primero, giroscopio después
    pub fn to_array(&self) -> [f32; AXES] {
        [self.ax, self.ay, self.az, self.gx, self.gy, self.gz]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Muestras de una ventana de captura, en orden de llegada.
///
/// Una ventana nunca está vacía: `Window::new` rechaza un vector sin muestras,
/// así que el remuestreador siempre recibe al menos una fila.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    samples: Vec<Sample>,
}

impl Window {
    pub fn new(samples: Vec<Sample>) -> Option<Self> {
        if samples.is_empty() {
            None
        } else {
            Some(Self { samples })
        }
    }

    /// Número de filas (muestras) de la ventana, siempre >= 1
    pub fn row_count(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn rows(&self) -> impl Iterator<Item = [f32; AXES]> + '_ {
        self.samples.iter().map(Sample::to_array)
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

/// Vector de características aplanado en orden temporal: fila 0 (6 ejes), fila 1, ...
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    /// Envuelve valores ya aplanados. El remuestreador garantiza `N * AXES`;
    /// otros orígenes (p. ej. un CSV) se validan en el clasificador.
    pub fn from_values(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn rows(&self) -> usize {
        self.values.len() / AXES
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(AXES)?;
        self.values.get(start..start + AXES)
    }

    /// Valores de un eje a lo largo del tiempo
    pub fn axis(&self, axis: usize) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().skip(axis).step_by(AXES).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }
}

/// Etiqueta discreta que produce el clasificador (p. ej. 0..=8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GestureLabel(pub u32);

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
