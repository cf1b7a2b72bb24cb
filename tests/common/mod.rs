//! Dobles de prueba compartidos por los tests de integración
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gesture_pilot::command_dispatcher::{MoveDirection, RotateDirection};
use gesture_pilot::gesture_classifier::{check_shape, Classifier, ClassifierError};
use gesture_pilot::source::{SampleSource, SourceError};
use gesture_pilot::types::{FeatureVector, GestureLabel, Sample};
use gesture_pilot::vehicle::{VehicleController, VehicleError};

/// Evento que entrega `ScriptedSource` en cada poll
#[derive(Debug, Clone)]
pub enum Event {
    Sample(Sample),
    Malformed,
    Disconnect,
}

/// Fuente guionizada. Sin eventos pendientes repite `idle` (o nada).
pub struct ScriptedSource {
    events: VecDeque<Event>,
    idle: Option<Sample>,
    pub clears: usize,
}

impl ScriptedSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into(),
            idle: None,
            clears: 0,
        }
    }

    /// Fuente que nunca se agota: siempre la misma muestra
    pub fn steady(sample: Sample) -> Self {
        Self::new(Vec::new()).with_idle(sample)
    }

    /// Muestra que se entrega cuando el guion se agota
    pub fn with_idle(mut self, sample: Sample) -> Self {
        self.idle = Some(sample);
        self
    }
}

impl SampleSource for ScriptedSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        match self.events.pop_front() {
            Some(Event::Sample(sample)) => Ok(Some(sample)),
            Some(Event::Malformed) => Err(SourceError::Malformed {
                line: "garbage".to_string(),
                reason: "scripted".to_string(),
            }),
            Some(Event::Disconnect) => Err(SourceError::Disconnected),
            None => {
                thread::sleep(timeout.min(Duration::from_millis(1)));
                Ok(self.idle)
            }
        }
    }

    fn clear(&mut self) -> Result<(), SourceError> {
        self.clears += 1;
        Ok(())
    }
}

/// Registro de llamadas del vehículo, compartido con el test
#[derive(Debug, Default)]
pub struct VehicleLog {
    pub calls: Vec<String>,
}

/// Vehículo falso configurable
#[derive(Clone)]
pub struct FakeVehicle {
    pub log: Arc<Mutex<VehicleLog>>,
    pub battery: u8,
    pub fail_land: bool,
    pub lose_link_on_move: bool,
}

impl FakeVehicle {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(VehicleLog::default())),
            battery: 90,
            fail_land: false,
            lose_link_on_move: false,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn push(&self, call: impl Into<String>) {
        self.log.lock().unwrap().calls.push(call.into());
    }
}

impl VehicleController for FakeVehicle {
    fn connect(&mut self) -> Result<(), VehicleError> {
        self.push("connect");
        Ok(())
    }

    fn battery(&mut self) -> Result<u8, VehicleError> {
        self.push("battery");
        Ok(self.battery)
    }

    fn calibrate_imu(&mut self) -> Result<(), VehicleError> {
        self.push("calibrate");
        Ok(())
    }

    fn takeoff(&mut self) -> Result<(), VehicleError> {
        self.push("takeoff");
        Ok(())
    }

    fn land(&mut self) -> Result<(), VehicleError> {
        self.push("land");
        if self.fail_land {
            return Err(VehicleError::Timeout {
                command: "land".to_string(),
                timeout: Duration::from_millis(1),
            });
        }
        Ok(())
    }

    fn move_by(&mut self, direction: MoveDirection, cm: u32) -> Result<(), VehicleError> {
        self.push(format!("{} {}", direction.as_str(), cm));
        if self.lose_link_on_move {
            return Err(VehicleError::Disconnected);
        }
        Ok(())
    }

    fn rotate_by(&mut self, direction: RotateDirection, degrees: u32) -> Result<(), VehicleError> {
        self.push(format!("{} {}", direction.as_str(), degrees));
        Ok(())
    }

    fn end(&mut self) -> Result<(), VehicleError> {
        self.push("end");
        Ok(())
    }
}

/// Clasificador que devuelve etiquetas en orden; la última se repite
pub struct FixedClassifier {
    labels: Vec<u32>,
    next: usize,
    expected: usize,
    pub seen: Arc<Mutex<Vec<FeatureVector>>>,
}

impl FixedClassifier {
    pub fn new(labels: Vec<u32>, expected: usize) -> Self {
        Self {
            labels,
            next: 0,
            expected,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Classifier for FixedClassifier {
    fn expected_features(&self) -> usize {
        self.expected
    }

    fn classify(&mut self, features: &FeatureVector) -> Result<GestureLabel, ClassifierError> {
        check_shape(self.expected, features)?;
        self.seen.lock().unwrap().push(features.clone());
        let idx = self.next.min(self.labels.len() - 1);
        self.next += 1;
        Ok(GestureLabel(self.labels[idx]))
    }
}

pub fn sample(value: f32) -> Sample {
    Sample::new(value, value * 2.0, -value, 0.5 * value, 1.0, value * value)
}
