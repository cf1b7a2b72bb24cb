pub mod cancel;
pub mod command_dispatcher;
pub mod config;
pub mod csv_loader;
pub mod flight_session;
pub mod gesture_classifier;
pub mod resampler;
pub mod source;
pub mod trigger;
pub mod types;
pub mod vehicle;
pub mod window_collector;

pub use cancel::CancelToken;
pub use command_dispatcher::{CommandAction, CommandDispatcher, GestureBinding};
pub use config::Config;
pub use flight_session::{FlightSession, SessionReport, SessionSettings, SessionState};
pub use gesture_classifier::{Classifier, OnnxClassifier};
pub use source::{SampleSource, SourceError};
pub use trigger::Trigger;
pub use types::{FeatureVector, GestureLabel, Sample, Window};
pub use vehicle::VehicleController;
pub use window_collector::WindowCollector;
