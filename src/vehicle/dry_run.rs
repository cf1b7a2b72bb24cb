use super::{VehicleController, VehicleError};
use crate::command_dispatcher::{MoveDirection, RotateDirection};

/// Vehículo simulado: registra cada comando y siempre tiene éxito.
/// Sirve para probar el mando en banco sin dron.
#[derive(Debug, Default)]
pub struct DryRunController {
    connected: bool,
    flying: bool,
    commands: Vec<String>,
}

impl DryRunController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Comandos emitidos hasta ahora, en orden
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn is_flying(&self) -> bool {
        self.flying
    }

    fn issue(&mut self, command: String) -> Result<(), VehicleError> {
        if !self.connected {
            return Err(VehicleError::Disconnected);
        }
        log::info!("🧪 [dry-run] {}", command);
        self.commands.push(command);
        Ok(())
    }
}

impl VehicleController for DryRunController {
    fn connect(&mut self) -> Result<(), VehicleError> {
        self.connected = true;
        self.issue("command".to_string())
    }

    fn battery(&mut self) -> Result<u8, VehicleError> {
        self.issue("battery?".to_string())?;
        Ok(100)
    }

    fn calibrate_imu(&mut self) -> Result<(), VehicleError> {
        self.issue("imu_calibration".to_string())
    }

    fn takeoff(&mut self) -> Result<(), VehicleError> {
        self.issue("takeoff".to_string())?;
        self.flying = true;
        Ok(())
    }

    fn land(&mut self) -> Result<(), VehicleError> {
        self.issue("land".to_string())?;
        self.flying = false;
        Ok(())
    }

    fn move_by(&mut self, direction: MoveDirection, cm: u32) -> Result<(), VehicleError> {
        self.issue(format!("{} {}", direction.as_str(), cm))
    }

    fn rotate_by(&mut self, direction: RotateDirection, degrees: u32) -> Result<(), VehicleError> {
        self.issue(format!("{} {}", direction.as_str(), degrees))
    }

    fn end(&mut self) -> Result<(), VehicleError> {
        self.connected = false;
        Ok(())
    }
}
