use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Señal de cancelación compartida entre el hilo de Ctrl-C y el bucle de control.
///
/// Se observa de dos formas: consultando `is_cancelled()` (dentro de la ventana
/// de captura) o esperando en `notified()` con `select!` (entre ciclos). Al
/// cancelar se suelta el emisor, con lo que el receptor queda desconectado y
/// cualquier `recv` pendiente se despierta.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    notify_tx: Mutex<Option<Sender<()>>>,
    notify_rx: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify_tx: Mutex::new(Some(tx)),
                notify_rx: rx,
            }),
        }
    }

    /// Idempotente: solo la primera llamada tiene efecto
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            let mut tx = self
                .inner
                .notify_tx
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            tx.take();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receptor que queda listo (desconectado) en cuanto se cancela
    pub fn notified(&self) -> &Receiver<()> {
        &self.inner.notify_rx
    }

    /// Conecta Ctrl-C con este token
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            log::warn!("🛑 Interrupción recibida, se aterrizará el dron");
            token.cancel();
        })
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
