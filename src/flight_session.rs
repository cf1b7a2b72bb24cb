//! Sesión de vuelo: máquina de estados dueña del ciclo de vida del vehículo
//!
//! ```text
//! Idle --connect--> Connected --takeoff--> Flying --(gesto LAND | Stop | Ctrl-C)--> Landed
//!                                             \--(error fatal | fallo al aterrizar)--> Faulted
//! ```
//!
//! Una vez emitido el despegue se intenta aterrizar exactamente una vez, salga
//! el bucle como salga (incluido `Drop`). El intento nunca se repite; su
//! resultado queda en el informe y después se libera el vehículo con `end()`.

use crate::cancel::CancelToken;
use crate::command_dispatcher::{CommandAction, CommandDispatcher};
use crate::csv_loader::WindowRecorder;
use crate::gesture_classifier::{Classifier, ClassifierError};
use crate::resampler::resample;
use crate::source::SampleSource;
use crate::trigger::Trigger;
use crate::types::{GestureLabel, DEFAULT_ROWS};
use crate::vehicle::{self, VehicleController, VehicleError};
use crate::window_collector::{CollectError, WindowCollector};
use crossbeam_channel::{select, Receiver};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Flying,
    Landed,
    Faulted,
}

impl SessionState {
    /// Landed y Faulted no admiten más ciclos
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Landed | SessionState::Faulted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Connected => "Connected",
            SessionState::Flying => "Flying",
            SessionState::Landed => "Landed",
            SessionState::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LandOutcome {
    /// No hubo despegue, así que no hacía falta aterrizar
    NotAttempted,
    Landed,
    Failed(String),
}

impl fmt::Display for LandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LandOutcome::NotAttempted => write!(f, "not attempted"),
            LandOutcome::Landed => write!(f, "landed"),
            LandOutcome::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Garantiza un único intento de aterrizaje
#[derive(Debug, Default)]
struct LandingGuard {
    attempted: AtomicBool,
}

impl LandingGuard {
    /// `true` solo para el primer llamante
    fn try_acquire(&self) -> bool {
        !self.attempted.swap(true, Ordering::SeqCst)
    }
}

/// Fallo de un ciclo de captura -> clasificación -> comando
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Window collection failed: {0}")]
    Collect(#[from] CollectError),

    #[error("Classification failed: {0}")]
    Classify(#[from] ClassifierError),

    #[error("Vehicle command failed: {0}")]
    Vehicle(#[from] VehicleError),

    #[error("Cycle requested in state {0}")]
    NotFlying(SessionState),
}

impl CycleError {
    /// Fallos que solo anulan el ciclo actual
    pub fn is_recoverable(&self) -> bool {
        match self {
            CycleError::Collect(e) => e.is_recoverable(),
            CycleError::Classify(e) => e.is_recoverable(),
            CycleError::Vehicle(e) => !e.is_connection_loss(),
            CycleError::NotFlying(_) => false,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, CycleError::Collect(CollectError::Cancelled))
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Vehicle handshake failed: {0}")]
    Handshake(#[source] VehicleError),

    #[error("Battery at {percent}% is below the {minimum}% minimum")]
    LowBattery { percent: u8, minimum: u8 },

    #[error("Takeoff failed: {0}")]
    Takeoff(#[source] VehicleError),

    #[error("{count} consecutive cycle failures, last: {last}")]
    RepeatedCycleFailures { count: u32, last: String },

    #[error("Operation requires state {expected}, session is {actual}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    #[error("Session interrupted by operator")]
    Interrupted,

    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Resultado de un ciclo completo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Executed {
        label: GestureLabel,
        action: CommandAction,
    },
    /// Etiqueta sin acción asociada: no se envía nada
    Unmapped { label: GestureLabel },
    /// El vehículo rechazó el movimiento; la sesión sigue
    CommandFailed {
        label: GestureLabel,
        action: CommandAction,
        reason: String,
    },
    /// Gesto terminal: se aterrizó y la sesión terminó
    Terminal {
        label: GestureLabel,
        outcome: LandOutcome,
    },
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Filas del vector de características
    pub rows: usize,
    pub max_consecutive_cycle_failures: u32,
    pub min_battery_percent: u8,
    pub calibrate_imu: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            max_consecutive_cycle_failures: 3,
            min_battery_percent: 10,
            calibrate_imu: true,
        }
    }
}

/// Un gesto reconocido durante la sesión
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureRecord {
    pub cycle: u32,
    pub label: GestureLabel,
    pub name: Option<String>,
    pub action: Option<CommandAction>,
    pub executed: bool,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub final_state: SessionState,
    pub cycles: u32,
    pub gestures: Vec<GestureRecord>,
    pub land_outcome: LandOutcome,
    pub fault: Option<String>,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Final state: {}", self.final_state)?;
        writeln!(f, "Cycles: {}", self.cycles)?;
        writeln!(f, "Landing: {}", self.land_outcome)?;
        if let Some(fault) = &self.fault {
            writeln!(f, "Fault: {}", fault)?;
        }
        for record in &self.gestures {
            let action = record
                .action
                .map_or_else(|| "-".to_string(), |a| a.to_string());
            writeln!(
                f,
                "  #{:<3} label {:<3} {:<14} {:<10} {}",
                record.cycle,
                record.label,
                record.name.as_deref().unwrap_or("?"),
                action,
                if record.executed { "ok" } else { "skipped" }
            )?;
        }
        Ok(())
    }
}

pub struct FlightSession<V, S, C>
where
    V: VehicleController,
    S: SampleSource,
    C: Classifier,
{
    vehicle: V,
    source: S,
    classifier: C,
    dispatcher: CommandDispatcher,
    collector: WindowCollector,
    settings: SessionSettings,
    cancel: CancelToken,
    recorder: Option<WindowRecorder>,

    state: SessionState,
    battery: Option<u8>,
    takeoff_issued: bool,
    landing: LandingGuard,
    land_outcome: LandOutcome,
    ended: bool,

    cycles: u32,
    consecutive_failures: u32,
    gestures: Vec<GestureRecord>,
    fault: Option<String>,
}

impl<V, S, C> FlightSession<V, S, C>
where
    V: VehicleController,
    S: SampleSource,
    C: Classifier,
{
    pub fn new(vehicle: V, source: S, classifier: C, dispatcher: CommandDispatcher) -> Self {
        Self {
            vehicle,
            source,
            classifier,
            dispatcher,
            collector: WindowCollector::default(),
            settings: SessionSettings::default(),
            cancel: CancelToken::new(),
            recorder: None,
            state: SessionState::Idle,
            battery: None,
            takeoff_issued: false,
            landing: LandingGuard::default(),
            land_outcome: LandOutcome::NotAttempted,
            ended: false,
            cycles: 0,
            consecutive_failures: 0,
            gestures: Vec::new(),
            fault: None,
        }
    }

    pub fn with_collector(mut self, collector: WindowCollector) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_recorder(mut self, recorder: WindowRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn vehicle(&self) -> &V {
        &self.vehicle
    }

    pub fn battery(&self) -> Option<u8> {
        self.battery
    }

    pub fn land_outcome(&self) -> &LandOutcome {
        &self.land_outcome
    }

    fn require_state(&self, expected: SessionState) -> Result<(), SessionError> {
        if self.state != expected {
            return Err(SessionError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Idle -> Connected: handshake y lectura de batería
    pub fn connect(&mut self) -> Result<(), SessionError> {
        self.require_state(SessionState::Idle)?;

        self.vehicle.connect().map_err(SessionError::Handshake)?;
        let battery = self.vehicle.battery().map_err(SessionError::Handshake)?;
        log::info!("🔋 Batería: {}%", battery);

        self.battery = Some(battery);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Connected -> Flying. Con batería insuficiente no se despega.
    pub fn take_off(&mut self) -> Result<(), SessionError> {
        self.require_state(SessionState::Connected)?;

        if let Some(percent) = self.battery {
            if percent < self.settings.min_battery_percent {
                return Err(SessionError::LowBattery {
                    percent,
                    minimum: self.settings.min_battery_percent,
                });
            }
        }

        if self.settings.calibrate_imu {
            match self.vehicle.calibrate_imu() {
                Ok(()) => log::info!("🧭 IMU del dron calibrada"),
                Err(e) => log::warn!("⚠️  Calibración de IMU fallida (se continúa): {}", e),
            }
        }

        // A partir de aquí el dron puede estar en el aire
        self.takeoff_issued = true;
        log::info!("🛫 Despegando...");
        self.vehicle.takeoff().map_err(SessionError::Takeoff)?;

        self.state = SessionState::Flying;
        log::info!("✅ En vuelo");
        Ok(())
    }

    /// Un ciclo completo: limpiar fuente, capturar, remuestrear, clasificar,
    /// despachar y ejecutar.
    ///
    /// Los errores recuperables anulan solo este ciclo. Un gesto terminal
    /// aterriza y deja la sesión en Landed (o Faulted si el aterrizaje falla).
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        if self.state != SessionState::Flying {
            return Err(CycleError::NotFlying(self.state));
        }

        self.cycles += 1;
        let cycle = self.cycles;
        log::info!("🎬 Ciclo {}: realiza el gesto", cycle);

        self.source
            .clear()
            .map_err(|e| CycleError::Collect(CollectError::Source(e)))?;
        let window = self.collector.collect(&mut self.source, &self.cancel)?;

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.record(&window) {
                log::warn!("⚠️  No se pudo guardar la ventana: {:#}", e);
            }
        }

        let features = resample(&window, self.settings.rows);
        let label = self.classifier.classify(&features)?;

        let name = self
            .dispatcher
            .name(label)
            .or_else(|| self.classifier.label_name(label))
            .map(str::to_string);
        log::info!(
            "🎯 Gesto detectado: {} ({})",
            name.as_deref().unwrap_or("?"),
            label
        );

        let mut record = GestureRecord {
            cycle,
            label,
            name,
            action: None,
            executed: false,
        };

        let Some(action) = self.dispatcher.dispatch(label) else {
            log::warn!("⚠️  Etiqueta {} sin comando asociado", label);
            self.gestures.push(record);
            return Ok(CycleOutcome::Unmapped { label });
        };
        record.action = Some(action);

        if self.dispatcher.is_terminal(label) {
            log::info!("🏁 Gesto de aterrizaje");
            let outcome = self.land();
            record.executed = outcome == LandOutcome::Landed;
            self.gestures.push(record);
            return Ok(CycleOutcome::Terminal { label, outcome });
        }

        // Una cancelación llegada durante la clasificación no debe mover el dron
        if self.cancel.is_cancelled() {
            log::info!("🛑 Cancelado antes de ejecutar: {}", action);
            self.gestures.push(record);
            return Err(CollectError::Cancelled.into());
        }

        log::info!("🚁 Ejecutando: {}", action);
        match vehicle::execute(&mut self.vehicle, action) {
            Ok(()) => {
                record.executed = true;
                self.gestures.push(record);
                Ok(CycleOutcome::Executed { label, action })
            }
            Err(e) if e.is_connection_loss() => {
                self.gestures.push(record);
                Err(e.into())
            }
            Err(e) => {
                log::warn!("⚠️  Comando '{}' fallido: {}", action, e);
                self.gestures.push(record);
                Ok(CycleOutcome::CommandFailed {
                    label,
                    action,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Bucle principal: conecta, despega si hace falta y ejecuta un ciclo por
    /// cada `Trigger::Next` hasta un estado terminal. Siempre intenta
    /// aterrizar (si se despegó) y libera el vehículo antes de devolver el
    /// informe.
    pub fn run(&mut self, triggers: &Receiver<Trigger>) -> SessionReport {
        if self.state == SessionState::Idle {
            if let Err(e) = self.connect() {
                self.fail(e);
                return self.finish();
            }
        }

        if self.state == SessionState::Connected {
            if let Err(e) = self.take_off() {
                self.fail(e);
                return self.finish();
            }
        }

        while self.state == SessionState::Flying {
            if !self.wait_for_trigger(triggers) {
                break;
            }

            match self.run_cycle() {
                Ok(CycleOutcome::Terminal { .. }) => break,
                Ok(_) => self.consecutive_failures = 0,
                Err(e) if e.is_cancellation() => {
                    self.interrupt();
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    self.consecutive_failures += 1;
                    log::warn!(
                        "⚠️  Ciclo anulado ({}/{}): {}",
                        self.consecutive_failures,
                        self.settings.max_consecutive_cycle_failures,
                        e
                    );
                    if self.consecutive_failures >= self.settings.max_consecutive_cycle_failures {
                        self.fail(SessionError::RepeatedCycleFailures {
                            count: self.consecutive_failures,
                            last: e.to_string(),
                        });
                    }
                }
                Err(e) => self.fail(e.into()),
            }
        }

        self.finish()
    }

    /// Espera el siguiente disparo. `false` si la sesión debe terminar
    /// (Stop, canal cerrado o cancelación), dejando el estado ya resuelto.
    fn wait_for_trigger(&mut self, triggers: &Receiver<Trigger>) -> bool {
        if self.cancel.is_cancelled() {
            self.interrupt();
            return false;
        }

        log::info!("⏳ Esperando disparo para el siguiente gesto...");
        let trigger = select! {
            recv(triggers) -> msg => msg.unwrap_or(Trigger::Stop),
            recv(self.cancel.notified()) -> _ => Trigger::Stop,
        };

        if self.cancel.is_cancelled() {
            self.interrupt();
            return false;
        }

        match trigger {
            Trigger::Next => true,
            Trigger::Stop => {
                log::info!("⏹️  Fin de sesión solicitado");
                self.land();
                false
            }
        }
    }

    fn interrupt(&mut self) {
        log::warn!("🛑 {}", SessionError::Interrupted);
        self.land();
    }

    /// Aterrizaje ordenado: Landed si el dron confirma, Faulted si no
    pub fn land(&mut self) -> LandOutcome {
        let outcome = self.land_once();
        match &outcome {
            LandOutcome::Failed(reason) => {
                self.fault = Some(format!("Landing failed: {}", reason));
                self.state = SessionState::Faulted;
            }
            _ => self.state = SessionState::Landed,
        }
        outcome
    }

    /// Error fatal: se aterriza (si se despegó) y la sesión queda en Faulted
    fn fail(&mut self, error: SessionError) {
        log::error!("❌ Error fatal: {}", error);
        self.fault = Some(error.to_string());
        let outcome = self.land_once();
        if let LandOutcome::Failed(reason) = &outcome {
            log::error!("❌ Además falló el aterrizaje: {}", reason);
        }
        self.state = SessionState::Faulted;
    }

    /// Único intento de aterrizaje de la sesión
    fn land_once(&mut self) -> LandOutcome {
        if !self.takeoff_issued {
            return self.land_outcome.clone();
        }
        if !self.landing.try_acquire() {
            return self.land_outcome.clone();
        }

        log::info!("🛬 Aterrizando...");
        self.land_outcome = match self.vehicle.land() {
            Ok(()) => {
                log::info!("✅ Aterrizaje completado");
                LandOutcome::Landed
            }
            Err(e) => {
                log::error!("❌ Aterrizaje fallido: {}", e);
                LandOutcome::Failed(e.to_string())
            }
        };
        self.land_outcome.clone()
    }

    fn end_once(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        if let Err(e) = self.vehicle.end() {
            log::warn!("⚠️  Error liberando el vehículo: {}", e);
        }
    }

    /// Cierra la sesión y construye el informe
    pub fn finish(&mut self) -> SessionReport {
        self.end_once();

        let report = SessionReport {
            final_state: self.state,
            cycles: self.cycles,
            gestures: self.gestures.clone(),
            land_outcome: self.land_outcome.clone(),
            fault: self.fault.clone(),
        };

        match report.final_state {
            SessionState::Faulted => log::error!("❌ Sesión terminada en {}", report.final_state),
            state => log::info!("✅ Sesión terminada en {}", state),
        }
        report
    }
}

impl<V, S, C> Drop for FlightSession<V, S, C>
where
    V: VehicleController,
    S: SampleSource,
    C: Classifier,
{
    fn drop(&mut self) {
        if self.takeoff_issued && !self.state.is_terminal() {
            log::warn!("⚠️  Sesión abandonada en vuelo, aterrizando");
            if self.land_once() != LandOutcome::Landed {
                self.state = SessionState::Faulted;
            }
        }
        self.end_once();
    }
}
