//! Disparadores del siguiente ciclo de captura
//!
//! El bucle de vuelo no sabe de dónde viene la señal: recibe `Trigger` por un
//! canal. Aquí están las dos fuentes habituales, la consola y un intervalo fijo.

use crossbeam_channel::{bounded, Receiver};
use std::io::{BufRead, BufReader, Stdin};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Capturar el siguiente gesto
    Next,
    /// Terminar la sesión (aterrizaje ordenado)
    Stop,
}

/// Una línea vacía (Enter) avanza; `q`, `quit` o fin de la entrada detienen
pub fn line_trigger<R>(reader: R) -> Receiver<Trigger>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = bounded(1);

    thread::spawn(move || {
        for line in reader.lines() {
            let trigger = match line {
                Ok(line) => match line.trim().to_ascii_lowercase().as_str() {
                    "q" | "quit" => Trigger::Stop,
                    _ => Trigger::Next,
                },
                Err(e) => {
                    log::error!("❌ Error leyendo la entrada: {}", e);
                    Trigger::Stop
                }
            };

            if tx.send(trigger).is_err() || trigger == Trigger::Stop {
                return;
            }
        }
        let _ = tx.send(Trigger::Stop);
    });

    rx
}

/// Lee la consola del operador
pub fn console_trigger() -> Receiver<Trigger> {
    line_trigger(console_reader())
}

// El hilo lector necesita poseer la entrada: `StdinLock` no es `Send`
fn console_reader() -> BufReader<Stdin> {
    BufReader::new(std::io::stdin())
}

/// Un ciclo cada `interval`, el primero de inmediato
pub fn interval_trigger(interval: Duration) -> Receiver<Trigger> {
    let (tx, rx) = bounded(1);

    thread::spawn(move || {
        if tx.send(Trigger::Next).is_err() {
            return;
        }
        loop {
            thread::sleep(interval);
            if tx.send(Trigger::Next).is_err() {
                return;
            }
        }
    });

    rx
}
