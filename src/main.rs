/*
Control de un dron Tello por gestos IMU

Cada ciclo:
1. Espera el disparo del operador (Enter) o del temporizador
2. Captura una ventana de 5 s de la IMU (ESP32 por serie o MPU-6050 por I2C)
3. Normaliza y remuestrea a 500 filas, clasifica con el SVM exportado a ONNX
4. Envía el comando al dron; el gesto LAND aterriza y termina la sesión

Ctrl-C, `q` o cualquier error fatal aterrizan el dron una sola vez.

Ejemplos:
     ./target/release/gesture-pilot --config gesture-pilot.toml
     ./target/release/gesture-pilot --port /dev/ttyUSB0 --dry-run
     RUST_LOG=debug ./target/release/gesture-pilot --model svm_model.onnx
*/

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use env_logger::{Builder, Env};
use std::path::PathBuf;

use gesture_pilot::cancel::CancelToken;
use gesture_pilot::config::{Config, SensorKind, TriggerKind, VehicleKind};
use gesture_pilot::csv_loader::WindowRecorder;
use gesture_pilot::flight_session::{FlightSession, SessionSettings, SessionState};
use gesture_pilot::gesture_classifier::OnnxClassifier;
use gesture_pilot::source::stream::open_serial;
use gesture_pilot::source::SampleSource;
use gesture_pilot::trigger::{console_trigger, interval_trigger, Trigger};
use gesture_pilot::vehicle::{DryRunController, TelloController, VehicleController};
use gesture_pilot::window_collector::WindowCollector;

#[derive(Parser, Debug)]
#[command(name = "gesture-pilot", version, about = "Pilota un dron con gestos capturados por una IMU")]
struct Cli {
    /// Fichero de configuración TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Puerto serie del sensor (sustituye sensor.port)
    #[arg(short, long)]
    port: Option<String>,

    /// Modelo ONNX (sustituye model.path)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// No vuela: registra los comandos en lugar de enviarlos
    #[arg(long)]
    dry_run: bool,

    /// Guarda cada ventana capturada en este directorio
    #[arg(long)]
    record_dir: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("No se pudo cargar la configuración {:?}", path))?,
        None => Config::default(),
    };

    if let Some(port) = &cli.port {
        config.sensor.kind = SensorKind::Serial;
        config.sensor.port = port.clone();
    }
    if let Some(model) = &cli.model {
        config.model.path = model.clone();
    }
    if cli.dry_run {
        config.vehicle.kind = VehicleKind::DryRun;
    }
    if let Some(dir) = &cli.record_dir {
        config.session.record_dir = Some(dir.clone());
    }

    config.validate()?;
    Ok(config)
}

fn open_source(config: &Config) -> Result<Box<dyn SampleSource>> {
    match config.sensor.kind {
        SensorKind::Serial => {
            let source = open_serial(&config.sensor.port, config.sensor.baud_rate)
                .with_context(|| format!("No se pudo abrir {}", config.sensor.port))?;
            Ok(Box::new(source))
        }
        #[cfg(feature = "linux-i2c")]
        SensorKind::I2c => {
            let source = gesture_pilot::source::polled::open_linux_mpu6050(
                &config.sensor.i2c_bus,
                config.sensor.i2c_address,
                config.sample_interval(),
            )?;
            Ok(Box::new(source))
        }
        #[cfg(not(feature = "linux-i2c"))]
        SensorKind::I2c => bail!("Sensor I2C no disponible: compila con --features linux-i2c"),
    }
}

fn open_vehicle(config: &Config) -> Result<Box<dyn VehicleController>> {
    match config.vehicle.kind {
        VehicleKind::Tello => Ok(Box::new(TelloController::new(config.tello_config()?))),
        VehicleKind::DryRun => {
            log::warn!("🧪 Modo dry-run: el dron no recibirá comandos");
            Ok(Box::new(DryRunController::new()))
        }
    }
}

fn trigger_for(config: &Config) -> Receiver<Trigger> {
    match config.session.trigger {
        TriggerKind::Console => {
            println!("Pulsa Enter para capturar un gesto, 'q' para aterrizar y salir");
            console_trigger()
        }
        TriggerKind::Interval => interval_trigger(config.trigger_interval()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    Builder::from_env(Env::default().default_filter_or(config.logging.level.as_str())).init();

    println!("🚁 gesture-pilot");
    log::info!("📂 Modelo: {:?}", config.model.path);

    let classifier = OnnxClassifier::load(
        &config.model.path,
        config.model.classes_path.as_deref(),
        config.expected_features(),
    )?;
    let dispatcher = config.dispatcher()?;
    let source = open_source(&config)?;
    let vehicle = open_vehicle(&config)?;

    let cancel = CancelToken::new();
    cancel
        .install_ctrlc_handler()
        .context("No se pudo instalar el manejador de Ctrl-C")?;

    let settings = SessionSettings {
        rows: config.window.rows,
        max_consecutive_cycle_failures: config.session.max_consecutive_cycle_failures,
        min_battery_percent: config.session.min_battery_percent,
        calibrate_imu: config.vehicle.calibrate_imu,
    };

    let mut session = FlightSession::new(vehicle, source, classifier, dispatcher)
        .with_collector(WindowCollector::new(config.window_duration()))
        .with_settings(settings)
        .with_cancel_token(cancel);

    if let Some(dir) = &config.session.record_dir {
        session = session.with_recorder(WindowRecorder::new(dir, "gesture")?);
    }

    let triggers = trigger_for(&config);
    let report = session.run(&triggers);

    println!("\n📋 Resumen de la sesión\n{}", report);

    if report.final_state == SessionState::Faulted {
        bail!(
            "La sesión terminó con fallo: {}",
            report.fault.as_deref().unwrap_or("desconocido")
        );
    }
    Ok(())
}
