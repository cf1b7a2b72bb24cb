use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use env_logger::{Builder, Env};
use gesture_pilot::config::Config;
use gesture_pilot::csv_loader::load_window_from_csv;
use gesture_pilot::gesture_classifier::{Classifier, OnnxClassifier};
use gesture_pilot::resampler::resample;
use gesture_pilot::types::AXES;

const USAGE: &str = "Uso: replay_window [--config <gesture-pilot.toml>] [--model <svm_model.onnx>] \
[--classes <classes.json>] [--rows N] [--dump-features] <ventana.csv>";

/// Opciones de línea de comandos; lo que no se indica sale de la configuración
#[derive(Debug, Default, PartialEq)]
struct ReplayOptions {
    csv_path: PathBuf,
    config_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
    classes_path: Option<PathBuf>,
    rows: Option<usize>,
    dump_features: bool,
}

impl ReplayOptions {
    /// Configuración del mando con los overrides de la línea de comandos
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("No se pudo cargar la configuración {:?}", path))?,
            None => Config::default(),
        };

        if let Some(path) = &self.model_path {
            config.model.path = path.clone();
        }
        if let Some(path) = &self.classes_path {
            config.model.classes_path = Some(path.clone());
        }
        if let Some(rows) = self.rows {
            config.window.rows = rows;
        }
        Ok(config)
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<ReplayOptions> {
    let mut csv_path: Option<PathBuf> = None;
    let mut opts = ReplayOptions::default();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dump-features" => opts.dump_features = true,
            "--config" => {
                opts.config_path = Some(args.next().map(PathBuf::from).ok_or_else(|| anyhow!(USAGE))?);
            }
            "--model" => {
                opts.model_path = Some(args.next().map(PathBuf::from).ok_or_else(|| anyhow!(USAGE))?);
            }
            "--classes" => {
                opts.classes_path = Some(args.next().map(PathBuf::from).ok_or_else(|| anyhow!(USAGE))?);
            }
            "--rows" => {
                let rows: usize = args
                    .next()
                    .ok_or_else(|| anyhow!(USAGE))?
                    .parse()
                    .map_err(|e| anyhow!("--rows inválido: {}", e))?;
                if rows == 0 {
                    bail!("--rows debe ser mayor que 0");
                }
                opts.rows = Some(rows);
            }
            _ => {
                if csv_path.is_some() {
                    bail!(USAGE);
                }
                csv_path = Some(PathBuf::from(arg));
            }
        }
    }

    opts.csv_path = csv_path.ok_or_else(|| anyhow!("Debes especificar un archivo CSV\n{}", USAGE))?;
    Ok(opts)
}

fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("warn")).init();

    let opts = parse_args(env::args().skip(1))?;
    let config = opts.resolve_config()?;
    let rows = config.window.rows;
    println!("🎞️  Reproduciendo gesto desde {:?}", opts.csv_path);

    let window = load_window_from_csv(&opts.csv_path)?;
    println!("ℹ️  {} muestras en la ventana", window.row_count());

    let features = resample(&window, rows);
    if window.row_count() > rows {
        println!("ℹ️  Truncada a las primeras {} filas", rows);
    } else if window.row_count() < rows {
        println!("ℹ️  Interpolada a {} filas", rows);
    }

    let mut classifier = OnnxClassifier::load(
        &config.model.path,
        config.model.classes_path.as_deref(),
        config.expected_features(),
    )?;
    let label = classifier.classify(&features)?;

    let dispatcher = config.dispatcher()?;
    let name = dispatcher
        .name(label)
        .or_else(|| classifier.label_name(label))
        .unwrap_or("?");

    println!("\n🥇 Etiqueta: {} ({})", label, name);
    match dispatcher.dispatch(label) {
        Some(action) if dispatcher.is_terminal(label) => {
            println!("🏁 Comando: {} (termina la sesión)", action)
        }
        Some(action) => println!("🚁 Comando: {}", action),
        None => println!("⚠️  Sin comando asociado"),
    }

    if opts.dump_features {
        println!("\n📊 {} features (fila, eje):", features.len());
        for (idx, value) in features.as_slice().iter().enumerate() {
            println!("  {:04} ({:03},{}): {:>10.6}", idx, idx / AXES, idx % AXES, value);
        }
    }

    Ok(())
}
