//! Cliente del SDK de texto del Tello sobre UDP
//!
//! Cada comando es un datagrama ASCII (`takeoff`, `up 50`, `battery?`) y el
//! dron responde `ok`, `error ...` o un valor.

use super::{VehicleController, VehicleError};
use crate::command_dispatcher::{MoveDirection, RotateDirection};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

/// Dirección del dron en su propia red WiFi
pub const TELLO_ADDRESS: &str = "192.168.10.1:8889";

const MIN_MOVE_CM: u32 = 20;
const MAX_MOVE_CM: u32 = 500;
const MIN_ROTATE_DEGREES: u32 = 1;
const MAX_ROTATE_DEGREES: u32 = 360;

/// Despegar y aterrizar tardan más que un comando normal
const MIN_FLIGHT_PHASE_TIMEOUT: Duration = Duration::from_secs(20);

const MAX_REPLY_SIZE: usize = 1518;

#[derive(Debug, Clone)]
pub struct TelloConfig {
    pub address: SocketAddr,
    pub local_bind: SocketAddr,
    pub command_timeout: Duration,
}

impl Default for TelloConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([192, 168, 10, 1], 8889)),
            local_bind: SocketAddr::from(([0, 0, 0, 0], 8889)),
            command_timeout: Duration::from_secs(7),
        }
    }
}

pub struct TelloController {
    config: TelloConfig,
    socket: Option<UdpSocket>,
}

impl TelloController {
    pub fn new(config: TelloConfig) -> Self {
        Self {
            config,
            socket: None,
        }
    }

    fn flight_phase_timeout(&self) -> Duration {
        self.config.command_timeout.max(MIN_FLIGHT_PHASE_TIMEOUT)
    }

    /// Descarta respuestas tardías de comandos anteriores
    fn drain_stale_replies(socket: &UdpSocket) -> Result<(), VehicleError> {
        socket.set_nonblocking(true)?;
        let mut buf = [0u8; MAX_REPLY_SIZE];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    log::debug!("Descartada respuesta tardía de {}: {:?}", from, String::from_utf8_lossy(&buf[..n]));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    socket.set_nonblocking(false)?;
                    return Err(e.into());
                }
            }
        }
        socket.set_nonblocking(false)?;
        Ok(())
    }

    /// Envía un comando y espera la respuesta del dron
    fn send_command(&self, command: &str, timeout: Duration) -> Result<String, VehicleError> {
        let socket = self.socket.as_ref().ok_or(VehicleError::Disconnected)?;

        Self::drain_stale_replies(socket)?;

        log::debug!("➡️  {}", command);
        socket.send_to(command.as_bytes(), self.config.address)?;

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; MAX_REPLY_SIZE];
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(VehicleError::Timeout {
                    command: command.to_string(),
                    timeout,
                });
            }
            socket.set_read_timeout(Some(deadline - now))?;

            match socket.recv_from(&mut buf) {
                Ok((n, from)) if from.ip() == self.config.address.ip() => {
                    let reply = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                    log::debug!("⬅️  {} -> {}", command, reply);
                    return Ok(reply);
                }
                Ok((_, from)) => {
                    log::debug!("Ignorado datagrama de {}", from);
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn expect_ok(&self, command: &str, timeout: Duration) -> Result<(), VehicleError> {
        let reply = self.send_command(command, timeout)?;
        interpret_ack(command, &reply)
    }
}

/// `ok` acepta, `error ...` rechaza, cualquier otra cosa es inesperada
fn interpret_ack(command: &str, reply: &str) -> Result<(), VehicleError> {
    if reply.eq_ignore_ascii_case("ok") {
        Ok(())
    } else if reply.to_ascii_lowercase().starts_with("error") {
        Err(VehicleError::Rejected {
            command: command.to_string(),
            reply: reply.to_string(),
        })
    } else {
        Err(VehicleError::UnexpectedReply {
            command: command.to_string(),
            reply: reply.to_string(),
        })
    }
}

fn clamp_logged(value: u32, min: u32, max: u32, unit: &str) -> u32 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        log::warn!("⚠️  {} {} fuera de rango, se usa {} {}", value, unit, clamped, unit);
    }
    clamped
}

impl VehicleController for TelloController {
    fn connect(&mut self) -> Result<(), VehicleError> {
        let socket = UdpSocket::bind(self.config.local_bind)?;
        self.socket = Some(socket);

        log::info!("🔌 Conectando con el dron en {}", self.config.address);
        if let Err(e) = self.expect_ok("command", self.config.command_timeout) {
            self.socket = None;
            return Err(e);
        }
        log::info!("✅ Dron en modo SDK");
        Ok(())
    }

    fn battery(&mut self) -> Result<u8, VehicleError> {
        let reply = self.send_command("battery?", self.config.command_timeout)?;
        reply
            .parse::<u8>()
            .map_err(|_| VehicleError::UnexpectedReply {
                command: "battery?".to_string(),
                reply,
            })
    }

    fn calibrate_imu(&mut self) -> Result<(), VehicleError> {
        self.expect_ok("imu_calibration", self.flight_phase_timeout())
    }

    fn takeoff(&mut self) -> Result<(), VehicleError> {
        self.expect_ok("takeoff", self.flight_phase_timeout())
    }

    fn land(&mut self) -> Result<(), VehicleError> {
        self.expect_ok("land", self.flight_phase_timeout())
    }

    fn move_by(&mut self, direction: MoveDirection, cm: u32) -> Result<(), VehicleError> {
        let cm = clamp_logged(cm, MIN_MOVE_CM, MAX_MOVE_CM, "cm");
        let command = format!("{} {}", direction.as_str(), cm);
        self.expect_ok(&command, self.config.command_timeout)
    }

    fn rotate_by(&mut self, direction: RotateDirection, degrees: u32) -> Result<(), VehicleError> {
        let degrees = clamp_logged(degrees, MIN_ROTATE_DEGREES, MAX_ROTATE_DEGREES, "°");
        let command = format!("{} {}", direction.as_str(), degrees);
        self.expect_ok(&command, self.config.command_timeout)
    }

    fn end(&mut self) -> Result<(), VehicleError> {
        if self.socket.take().is_some() {
            log::info!("🔌 Enlace con el dron cerrado");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    /// Dron falso: responde según `reply` y devuelve los comandos recibidos
    fn spawn_fake_drone(
        reply: fn(&str) -> Option<String>,
    ) -> (SocketAddr, thread::JoinHandle<Vec<String>>, mpsc::Sender<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let address = socket.local_addr().unwrap();
        let (stop_tx, stop_rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let mut received = Vec::new();
            let mut buf = [0u8; 256];
            while stop_rx.try_recv().is_err() {
                if let Ok((n, from)) = socket.recv_from(&mut buf) {
                    let command = String::from_utf8_lossy(&buf[..n]).to_string();
                    if let Some(answer) = reply(&command) {
                        socket.send_to(answer.as_bytes(), from).unwrap();
                    }
                    received.push(command);
                }
            }
            received
        });

        (address, handle, stop_tx)
    }

    fn controller_for(address: SocketAddr, timeout: Duration) -> TelloController {
        TelloController::new(TelloConfig {
            address,
            local_bind: "127.0.0.1:0".parse().unwrap(),
            command_timeout: timeout,
        })
    }

    #[test]
    fn test_session_commands_over_udp() {
        let (address, handle, stop) = spawn_fake_drone(|command| match command {
            "battery?" => Some("87\r\n".to_string()),
            "up 500" => Some("error Out of range".to_string()),
            _ => Some("ok".to_string()),
        });

        let mut tello = controller_for(address, Duration::from_secs(2));
        tello.connect().unwrap();
        assert_eq!(tello.battery().unwrap(), 87);
        tello.takeoff().unwrap();
        tello.move_by(MoveDirection::Forward, 5).unwrap();
        tello.rotate_by(RotateDirection::Clockwise, 45).unwrap();
        let err = tello.move_by(MoveDirection::Up, 900).unwrap_err();
        assert!(matches!(err, VehicleError::Rejected { .. }));
        tello.land().unwrap();
        tello.end().unwrap();

        stop.send(()).unwrap();
        let received = handle.join().unwrap();
        assert_eq!(
            received,
            vec!["command", "battery?", "takeoff", "forward 20", "cw 45", "up 500", "land"]
        );
    }

    #[test]
    fn test_silent_drone_times_out() {
        let (address, handle, stop) = spawn_fake_drone(|_| None);

        let mut tello = controller_for(address, Duration::from_millis(100));
        let err = tello.connect().unwrap_err();
        assert!(matches!(err, VehicleError::Timeout { .. }));
        assert!(!err.is_connection_loss());

        // Sin handshake no hay socket
        assert!(matches!(
            tello.battery().unwrap_err(),
            VehicleError::Disconnected
        ));

        stop.send(()).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_interpret_ack() {
        assert!(interpret_ack("land", "ok").is_ok());
        assert!(matches!(
            interpret_ack("land", "error Motor stop"),
            Err(VehicleError::Rejected { .. })
        ));
        assert!(matches!(
            interpret_ack("land", "72"),
            Err(VehicleError::UnexpectedReply { .. })
        ));
    }
}
