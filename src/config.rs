//! Configuración del mando
//!
//! Se carga desde TOML. Todas las secciones tienen valores por defecto, así
//! que un fichero parcial (o ninguno) es válido.

use crate::command_dispatcher::{default_bindings, CommandDispatcher, GestureBinding};
use crate::vehicle::{TelloConfig, TELLO_ADDRESS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorConfig,
    pub window: WindowConfig,
    pub model: ModelConfig,
    pub vehicle: VehicleConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    /// Sustituye la tabla de gestos por defecto
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gestures: Option<Vec<GestureBinding>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensorKind {
    /// ESP32 enviando registros de texto por puerto serie
    Serial,
    /// MPU-6050 directamente en un bus I2C
    I2c,
}

/// Sensor IMU
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    pub kind: SensorKind,
    pub port: String,
    pub baud_rate: u32,
    pub i2c_bus: String,
    pub i2c_address: u8,
    /// Periodo de muestreo del sensor I2C
    pub sample_interval_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            kind: SensorKind::Serial,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            i2c_bus: "/dev/i2c-1".to_string(),
            i2c_address: 0x68,
            sample_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    pub duration_secs: f32,
    /// Filas del vector de características (`N`)
    pub rows: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            duration_secs: crate::types::DEFAULT_WINDOW_SECS,
            rows: crate::types::DEFAULT_ROWS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes_path: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("svm_model.onnx"),
            classes_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VehicleKind {
    Tello,
    DryRun,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub kind: VehicleKind,
    pub address: String,
    pub local_bind: String,
    pub command_timeout_ms: u64,
    /// Calibrar la IMU del dron antes de despegar
    pub calibrate_imu: bool,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            kind: VehicleKind::Tello,
            address: TELLO_ADDRESS.to_string(),
            local_bind: "0.0.0.0:8889".to_string(),
            command_timeout_ms: 7000,
            calibrate_imu: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    Console,
    Interval,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub trigger: TriggerKind,
    pub interval_secs: f32,
    /// Ciclos fallidos seguidos antes de aterrizar por seguridad
    pub max_consecutive_cycle_failures: u32,
    pub min_battery_percent: u8,
    /// Si se indica, cada ventana capturada se guarda como CSV
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerKind::Console,
            interval_secs: 8.0,
            max_consecutive_cycle_failures: 3,
            min_battery_percent: 10,
            record_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Nivel de log (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Carga y valida la configuración desde un fichero TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(ConfigError::Invalid(msg)) };

        if self.window.rows == 0 {
            return invalid("window.rows must be greater than 0".to_string());
        }
        if !(self.window.duration_secs.is_finite() && self.window.duration_secs > 0.0) {
            return invalid(format!(
                "window.duration_secs must be positive, got {}",
                self.window.duration_secs
            ));
        }
        if self.session.trigger == TriggerKind::Interval
            && !(self.session.interval_secs.is_finite() && self.session.interval_secs > 0.0)
        {
            return invalid(format!(
                "session.interval_secs must be positive, got {}",
                self.session.interval_secs
            ));
        }
        if self.session.max_consecutive_cycle_failures == 0 {
            return invalid("session.max_consecutive_cycle_failures must be at least 1".to_string());
        }
        if self.session.min_battery_percent > 100 {
            return invalid(format!(
                "session.min_battery_percent must be <= 100, got {}",
                self.session.min_battery_percent
            ));
        }
        if self.vehicle.kind == VehicleKind::Tello {
            self.tello_config()?;
        }
        if let Some(gestures) = &self.gestures {
            if gestures.is_empty() {
                return invalid("gestures table is empty".to_string());
            }
            CommandDispatcher::new(gestures).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Tabla de gestos configurada, o la tabla por defecto
    pub fn gesture_bindings(&self) -> Vec<GestureBinding> {
        self.gestures.clone().unwrap_or_else(default_bindings)
    }

    pub fn dispatcher(&self) -> Result<CommandDispatcher> {
        CommandDispatcher::new(&self.gesture_bindings())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn window_duration(&self) -> Duration {
        Duration::from_secs_f32(self.window.duration_secs)
    }

    /// Valores que espera el clasificador (`rows * 6`)
    pub fn expected_features(&self) -> usize {
        self.window.rows * crate::types::AXES
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sensor.sample_interval_ms)
    }

    pub fn trigger_interval(&self) -> Duration {
        Duration::from_secs_f32(self.session.interval_secs)
    }

    pub fn tello_config(&self) -> Result<TelloConfig> {
        let parse = |field: &str, value: &str| {
            value.parse::<SocketAddr>().map_err(|e| {
                ConfigError::Invalid(format!("vehicle.{} {:?}: {}", field, value, e))
            })
        };

        Ok(TelloConfig {
            address: parse("address", &self.vehicle.address)?,
            local_bind: parse("local_bind", &self.vehicle.local_bind)?,
            command_timeout: Duration::from_millis(self.vehicle.command_timeout_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_dispatcher::ActionKind;
    use crate::types::GestureLabel;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.sensor.kind, SensorKind::Serial);
        assert_eq!(config.sensor.baud_rate, 115_200);
        assert_eq!(config.sensor.i2c_address, 0x68);
        assert_eq!(config.window.rows, 500);
        assert_eq!(config.expected_features(), 3000);
        assert_eq!(config.window_duration(), Duration::from_secs(5));
        assert_eq!(config.session.max_consecutive_cycle_failures, 3);
        assert_eq!(config.gesture_bindings().len(), 9);
        assert_eq!(
            config.tello_config().unwrap().address,
            "192.168.10.1:8889".parse().unwrap()
        );
    }

    #[test]
    fn test_partial_file() {
        let toml_content = r#"
[sensor]
kind = "i2c"
i2c_address = 0x69

[vehicle]
kind = "dry-run"

[session]
trigger = "interval"
interval_secs = 2.5
record_dir = "windows"

[[gestures]]
label = 0
name = "LAND"
action = "land"

[[gestures]]
label = 3
name = "SPIN"
action = "rotate_cw"
amount = 90
"#;

        let config = Config::from_toml(toml_content).unwrap();
        assert_eq!(config.sensor.kind, SensorKind::I2c);
        assert_eq!(config.sensor.i2c_address, 0x69);
        assert_eq!(config.sensor.baud_rate, 115_200);
        assert_eq!(config.vehicle.kind, VehicleKind::DryRun);
        assert_eq!(config.session.trigger, TriggerKind::Interval);
        assert_eq!(config.session.record_dir, Some(PathBuf::from("windows")));

        let bindings = config.gesture_bindings();
        assert_eq!(bindings[1].action, ActionKind::RotateCw);
        assert_eq!(bindings[1].amount, Some(90));

        let dispatcher = config.dispatcher().unwrap();
        assert!(dispatcher.is_terminal(GestureLabel(0)));
        assert_eq!(dispatcher.dispatch(GestureLabel(8)), None);
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "[window]\nrows = 0",
            "[window]\nduration_secs = -1.0",
            "[session]\nmax_consecutive_cycle_failures = 0",
            "[vehicle]\naddress = \"not-an-address\"",
            "[[gestures]]\nlabel = 1\nname = \"A\"\naction = \"up\"\n\n[[gestures]]\nlabel = 1\nname = \"B\"\naction = \"down\"",
        ];

        for case in cases {
            let err = Config::from_toml(case).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{}: {}", case, err);
        }

        assert!(matches!(
            Config::from_toml("[sensor]\nkind = \"bluetooth\"").unwrap_err(),
            ConfigError::Toml(_)
        ));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/gesture-pilot.toml");
        let config = Config::from_file(path).unwrap();
        let defaults = Config::default();
        assert_eq!(config.sensor.port, defaults.sensor.port);
        assert_eq!(config.window.rows, defaults.window.rows);
        assert_eq!(config.vehicle.address, defaults.vehicle.address);
        assert_eq!(config.session.trigger, defaults.session.trigger);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gesture-pilot.toml");

        let mut config = Config::default();
        config.window.rows = 250;
        config.logging.level = "debug".to_string();
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.window.rows, 250);
        assert_eq!(loaded.logging.level, "debug");
        assert!(loaded.gestures.is_none());
    }
}
