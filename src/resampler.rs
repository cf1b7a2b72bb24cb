//! Ventana de longitud variable -> vector de características de longitud fija
//!
//! Debe reproducir exactamente el preprocesado con el que se entrenó el modelo:
//! 1. Normalización min-max por eje sobre toda la ventana.
//! 2. Si hay al menos `N` filas se toman las `N` primeras (truncado, no
//!    submuestreo uniforme); si hay menos, interpolación lineal por eje en `N`
//!    posiciones equiespaciadas sobre `[0, R-1]`.
//! 3. Aplanado fila a fila.
//!
//! Los cálculos se hacen en f64 y se redondean a f32 al final.

use crate::types::{FeatureVector, Window, AXES};

/// Normaliza cada eje a [0, 1]. Un eje constante (max == min) queda a 0.
pub fn normalize(window: &Window) -> Vec<[f64; AXES]> {
    let mut min = [f64::INFINITY; AXES];
    let mut max = [f64::NEG_INFINITY; AXES];

    for row in window.rows() {
        for (axis, &value) in row.iter().enumerate() {
            let value = value as f64;
            min[axis] = min[axis].min(value);
            max[axis] = max[axis].max(value);
        }
    }

    let mut range = [0.0f64; AXES];
    for axis in 0..AXES {
        range[axis] = max[axis] - min[axis];
    }

    window
        .rows()
        .map(|row| {
            let mut out = [0.0f64; AXES];
            for axis in 0..AXES {
                if range[axis] > 0.0 && range[axis].is_finite() {
                    out[axis] = (row[axis] as f64 - min[axis]) / range[axis];
                }
            }
            out
        })
        .collect()
}

/// Posiciones equiespaciadas en `[start, stop]`, extremos incluidos
fn linspace(start: f64, stop: f64, count: usize) -> impl Iterator<Item = f64> {
    let step = if count > 1 {
        (stop - start) / (count - 1) as f64
    } else {
        0.0
    };
    (0..count).map(move |i| {
        if count > 1 && i == count - 1 {
            stop
        } else {
            start + i as f64 * step
        }
    })
}

/// Valor de la poligonal por los puntos `(k, rows[k][axis])` en la posición `x`.
/// Fuera de `[0, R-1]` se satura al extremo.
pub fn interpolate_at(rows: &[[f64; AXES]], axis: usize, x: f64) -> f64 {
    let last = rows.len() - 1;
    if last == 0 || x <= 0.0 {
        return rows[0][axis];
    }
    if x >= last as f64 {
        return rows[last][axis];
    }

    let k = x.floor() as usize;
    let frac = x - k as f64;
    let left = rows[k][axis];
    let right = rows[k + 1][axis];
    left + frac * (right - left)
}

/// Interpola las filas hasta `target` filas
fn expand_by_interpolation(rows: &[[f64; AXES]], target: usize) -> Vec<[f64; AXES]> {
    let last = (rows.len() - 1) as f64;
    linspace(0.0, last, target)
        .map(|x| {
            let mut out = [0.0f64; AXES];
            for (axis, slot) in out.iter_mut().enumerate() {
                *slot = interpolate_at(rows, axis, x);
            }
            out
        })
        .collect()
}

/// Convierte una ventana en un vector de exactamente `rows * AXES` valores
pub fn resample(window: &Window, rows: usize) -> FeatureVector {
    let normalized = normalize(window);

    let fitted = if normalized.len() >= rows {
        log::debug!("Truncando {} filas a {}", normalized.len(), rows);
        normalized[..rows].to_vec()
    } else {
        log::debug!("Interpolando {} filas a {}", normalized.len(), rows);
        expand_by_interpolation(&normalized, rows)
    };

    let values = fitted
        .iter()
        .flat_map(|row| row.iter().map(|&v| v as f32))
        .collect();

    FeatureVector::from_values(values)
}
