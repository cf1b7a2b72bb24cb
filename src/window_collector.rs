use crate::cancel::CancelToken;
use crate::source::{SampleSource, SourceError};
use crate::types::{Window, DEFAULT_WINDOW_SECS};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Tiempo máximo de bloqueo de un poll individual, para poder ver la cancelación
const DEFAULT_POLL_QUANTUM: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("No samples accepted during {0:?}")]
    EmptyWindow(Duration),

    #[error("Collection cancelled")]
    Cancelled,

    #[error("Sample source failed: {0}")]
    Source(#[from] SourceError),
}

impl CollectError {
    /// Solo una ventana vacía permite reintentar el ciclo
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CollectError::EmptyWindow(_))
    }
}

/// Captura una ventana de duración fija desde una fuente de muestras
#[derive(Debug, Clone)]
pub struct WindowCollector {
    duration: Duration,
    poll_quantum: Duration,
}

impl WindowCollector {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            poll_quantum: DEFAULT_POLL_QUANTUM,
        }
    }

    pub fn with_poll_quantum(mut self, quantum: Duration) -> Self {
        self.poll_quantum = quantum.max(Duration::from_millis(1));
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Lee muestras hasta agotar la duración de la ventana.
    ///
    /// Los registros malformados y los fallos transitorios se descartan; un
    /// error fatal de la fuente o una cancelación abortan la ventana. Si no se
    /// aceptó ninguna muestra el resultado es `EmptyWindow`.
    pub fn collect<S>(&self, source: &mut S, cancel: &CancelToken) -> Result<Window, CollectError>
    where
        S: SampleSource + ?Sized,
    {
        let start = Instant::now();
        let mut samples = Vec::new();
        let mut dropped = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(CollectError::Cancelled);
            }

            let elapsed = start.elapsed();
            if elapsed >= self.duration {
                break;
            }

            let timeout = (self.duration - elapsed).min(self.poll_quantum);
            match source.poll(timeout) {
                Ok(Some(sample)) => samples.push(sample),
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    dropped += 1;
                    log::warn!("⚠️  Registro descartado: {}", e);
                }
                Err(e) => {
                    log::error!("❌ Fuente de muestras perdida tras {:?}: {}", start.elapsed(), e);
                    return Err(e.into());
                }
            }
        }

        log::info!(
            "📥 Ventana capturada: {} muestras ({} descartadas) en {:.2}s",
            samples.len(),
            dropped,
            start.elapsed().as_secs_f32()
        );

        Window::new(samples).ok_or(CollectError::EmptyWindow(self.duration))
    }
}

impl Default for WindowCollector {
    fn default() -> Self {
        Self::new(Duration::from_secs_f32(DEFAULT_WINDOW_SECS))
    }
}
