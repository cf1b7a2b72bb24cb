//! Control del vehículo: el dron recibe comandos de alto nivel y responde
//! con un acuse por comando.

mod dry_run;
mod tello;

pub use dry_run::DryRunController;
pub use tello::{TelloConfig, TelloController, TELLO_ADDRESS};

use crate::command_dispatcher::{CommandAction, MoveDirection, RotateDirection};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VehicleError {
    #[error("Vehicle not connected")]
    Disconnected,

    #[error("No reply to '{command}' within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Vehicle rejected '{command}': {reply}")]
    Rejected { command: String, reply: String },

    #[error("Unexpected reply to '{command}': {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VehicleError {
    /// Sin enlace con el vehículo no tiene sentido seguir enviando comandos
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, VehicleError::Disconnected | VehicleError::Io(_))
    }
}

/// Operaciones de vuelo que necesita la sesión. Todas pueden fallar.
pub trait VehicleController {
    fn connect(&mut self) -> Result<(), VehicleError>;

    /// Batería en porcentaje
    fn battery(&mut self) -> Result<u8, VehicleError>;

    fn calibrate_imu(&mut self) -> Result<(), VehicleError>;

    fn takeoff(&mut self) -> Result<(), VehicleError>;

    fn land(&mut self) -> Result<(), VehicleError>;

    fn move_by(&mut self, direction: MoveDirection, cm: u32) -> Result<(), VehicleError>;

    fn rotate_by(&mut self, direction: RotateDirection, degrees: u32) -> Result<(), VehicleError>;

    /// Libera el enlace. Se llama una vez al cerrar la sesión.
    fn end(&mut self) -> Result<(), VehicleError>;
}

impl<V: VehicleController + ?Sized> VehicleController for Box<V> {
    fn connect(&mut self) -> Result<(), VehicleError> {
        (**self).connect()
    }

    fn battery(&mut self) -> Result<u8, VehicleError> {
        (**self).battery()
    }

    fn calibrate_imu(&mut self) -> Result<(), VehicleError> {
        (**self).calibrate_imu()
    }

    fn takeoff(&mut self) -> Result<(), VehicleError> {
        (**self).takeoff()
    }

    fn land(&mut self) -> Result<(), VehicleError> {
        (**self).land()
    }

    fn move_by(&mut self, direction: MoveDirection, cm: u32) -> Result<(), VehicleError> {
        (**self).move_by(direction, cm)
    }

    fn rotate_by(&mut self, direction: RotateDirection, degrees: u32) -> Result<(), VehicleError> {
        (**self).rotate_by(direction, degrees)
    }

    fn end(&mut self) -> Result<(), VehicleError> {
        (**self).end()
    }
}

/// Ejecuta un descriptor de comando sobre el vehículo
pub fn execute<V>(vehicle: &mut V, action: CommandAction) -> Result<(), VehicleError>
where
    V: VehicleController + ?Sized,
{
    match action {
        CommandAction::Move { direction, cm } => vehicle.move_by(direction, cm),
        CommandAction::Rotate { direction, degrees } => vehicle.rotate_by(direction, degrees),
        CommandAction::Land => vehicle.land(),
    }
}
