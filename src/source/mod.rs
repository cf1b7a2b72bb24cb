//! Fuentes de muestras IMU
//!
//! Dos variantes detrás del mismo contrato `SampleSource`:
//! - [`stream::StreamSource`]: registros de texto por línea sobre un flujo de
//!   bytes (ESP32 por puerto serie).
//! - [`polled::PolledSource`]: IMU leída por registros (MPU-6050 por I2C).

pub mod polled;
pub mod stream;

use crate::types::Sample;
use std::time::Duration;
use thiserror::Error;

pub use polled::{ImuDevice, Mpu6050, PolledSource};
pub use stream::{parse_record, StreamSource, Transport};

#[derive(Error, Debug)]
pub enum SourceError {
    /// Registro con formato inválido; se descarta y se sigue leyendo
    #[error("Malformed record {line:?}: {reason}")]
    Malformed { line: String, reason: String },

    /// Fallo de lectura puntual de la IMU; se reintenta en el siguiente poll
    #[error("Transient read failure: {0}")]
    Transient(String),

    #[error("Sample source disconnected")]
    Disconnected,

    #[error("Sample source unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl SourceError {
    /// Errores por registro: el colector los registra y continúa
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SourceError::Malformed { .. } | SourceError::Transient(_))
    }
}

/// Fuente uniforme de muestras de 6 ejes
pub trait SampleSource {
    /// Espera como mucho `timeout` por una muestra nueva.
    ///
    /// `Ok(None)` significa que no hay muestra disponible todavía; el fin del
    /// flujo se informa como `SourceError::Disconnected`.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError>;

    /// Descarta datos antiguos para que la siguiente ventana empiece en un
    /// límite de registro
    fn clear(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        (**self).poll(timeout)
    }

    fn clear(&mut self) -> Result<(), SourceError> {
        (**self).clear()
    }
}
