//! Fuente por flujo de texto: una línea por muestra
//!
//! Formato de registro que envía el ESP32:
//! `<cabecera>, ax, ay, az, gx, gy, gz, <cola>`
//! La cabecera y la cola se ignoran; deben quedar exactamente 6 valores.

use super::{SampleSource, SourceError};
use crate::types::{Sample, AXES};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, ErrorKind, Read};
use std::time::Duration;

const READ_CHUNK: usize = 256;

/// Una línea sin salto tras este tamaño se considera basura y se descarta
const MAX_RECORD_LEN: usize = 1024;

/// Capa de transporte de bytes bajo la fuente por flujo
pub trait Transport {
    /// Lee bytes; `Ok(0)` indica fin del flujo
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize>;

    /// Bytes esperando en el buffer de entrada
    fn available(&mut self) -> io::Result<usize>;

    /// Límite de bloqueo para la siguiente lectura
    fn set_read_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for Box<dyn SerialPort> {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buffer)
    }

    fn available(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        // serialport no acepta timeout cero
        let timeout = timeout.max(Duration::from_millis(1));
        self.as_mut().set_timeout(timeout)?;
        Ok(())
    }
}

/// Abre el puerto serie del ESP32 (8N1, sin control de flujo)
pub fn open_serial(path: &str, baud_rate: u32) -> Result<StreamSource<Box<dyn SerialPort>>, SourceError> {
    let port = serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_secs(1))
        .open()?;

    // Lo que hubiera en el buffer del sistema antes de abrir no nos interesa
    port.clear(ClearBuffer::Input)?;

    log::info!("🔌 Puerto serie abierto: {} a {} baudios", path, baud_rate);
    Ok(StreamSource::new(port))
}

/// Convierte una línea de texto en una muestra
pub fn parse_record(line: &str) -> Result<Sample, SourceError> {
    let malformed = |reason: String| SourceError::Malformed {
        line: line.to_string(),
        reason,
    };

    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != AXES + 2 {
        return Err(malformed(format!(
            "expected {} fields, got {}",
            AXES + 2,
            fields.len()
        )));
    }

    let mut values = [0.0f32; AXES];
    for (slot, raw) in values.iter_mut().zip(&fields[1..fields.len() - 1]) {
        let value: f32 = raw
            .trim()
            .parse()
            .map_err(|_| malformed(format!("non-numeric field {:?}", raw.trim())))?;
        if !value.is_finite() {
            return Err(malformed(format!("non-finite field {:?}", raw.trim())));
        }
        *slot = value;
    }

    Ok(Sample::from_array(values))
}

/// Fuente de muestras sobre cualquier `Transport` orientado a líneas
pub struct StreamSource<T: Transport> {
    transport: T,
    pending: Vec<u8>,
    /// Tras un `clear()` a mitad de registro, la primera línea está incompleta
    resync: bool,
}

impl<T: Transport> StreamSource<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            pending: Vec::with_capacity(READ_CHUNK),
            resync: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Extrae la siguiente línea completa y no vacía del buffer pendiente
    fn take_line(&mut self) -> Option<Result<String, SourceError>> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();

            if self.resync {
                self.resync = false;
                continue;
            }

            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(SourceError::Malformed {
                        line: String::from_utf8_lossy(e.as_bytes()).trim().to_string(),
                        reason: "invalid UTF-8".to_string(),
                    }))
                }
            };

            let line = line.trim();
            if !line.is_empty() {
                return Some(Ok(line.to_string()));
            }
        }

        if self.pending.len() > MAX_RECORD_LEN {
            let garbage = String::from_utf8_lossy(&self.pending).to_string();
            self.pending.clear();
            return Some(Err(SourceError::Malformed {
                line: garbage,
                reason: format!("no line terminator within {} bytes", MAX_RECORD_LEN),
            }));
        }

        None
    }

    fn next_record(&mut self) -> Option<Result<Sample, SourceError>> {
        self.take_line().map(|line| {
            let line = line?;
            log::trace!("Línea recibida: {}", line);
            parse_record(&line)
        })
    }
}

impl<T: Transport> SampleSource for StreamSource<T> {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        if let Some(record) = self.next_record() {
            return record.map(Some);
        }

        self.transport.set_read_timeout(timeout)?;
        let mut buf = [0u8; READ_CHUNK];
        match self.transport.read(&mut buf) {
            Ok(0) => Err(SourceError::Disconnected),
            Ok(n) => {
                self.pending.extend_from_slice(&buf[..n]);
                self.next_record().transpose()
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::UnexpectedEof
                        | ErrorKind::BrokenPipe
                        | ErrorKind::NotConnected
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::ConnectionReset
                ) =>
            {
                Err(SourceError::Disconnected)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&mut self) -> Result<(), SourceError> {
        let mut buf = [0u8; READ_CHUNK];
        let mut discarded = 0usize;

        loop {
            let waiting = self.transport.available()?;
            if waiting == 0 {
                break;
            }
            let n = self.transport.read(&mut buf[..waiting.min(READ_CHUNK)])?;
            if n == 0 {
                return Err(SourceError::Disconnected);
            }
            self.pending.extend_from_slice(&buf[..n]);
            discarded += n;
        }

        // Todo lo pendiente es anterior a la ventana nueva. Si lo descartado no
        // termina en salto de línea, el resto de ese registro sigue en camino.
        if let Some(&last) = self.pending.last() {
            self.resync = last != b'\n';
        }
        self.pending.clear();

        log::debug!("Buffer serie limpiado ({} bytes descartados)", discarded);
        Ok(())
    }
}
