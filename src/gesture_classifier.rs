use crate::types::{FeatureVector, GestureLabel};
use ort::session::Session;
use ort::tensor::TensorElementType;
use ort::value::{Value, ValueType};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Failed to load model {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("Invalid feature size: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("ONNX Runtime error: {0}")]
    OnnxError(#[from] ort::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("No output tensor found")]
    NoOutputTensor,

    #[error("Model returned invalid label {0}")]
    InvalidLabel(i64),

    #[error("Missing ONNX {kind}")]
    MissingIo { kind: &'static str },
}

impl ClassifierError {
    /// Un vector con la forma equivocada solo invalida el ciclo actual
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClassifierError::ShapeMismatch { .. })
    }
}

/// Predictor sin estado: vector de características -> etiqueta de gesto.
///
/// `classify` toma `&mut self` solo porque el runtime lo exige para ejecutar
/// la sesión; el modelo no cambia tras cargarse.
pub trait Classifier {
    /// Número de valores que espera el modelo (`N * 6`)
    fn expected_features(&self) -> usize;

    fn classify(&mut self, features: &FeatureVector) -> Result<GestureLabel, ClassifierError>;

    /// Nombre legible de la clase, si el modelo lo conoce
    fn label_name(&self, _label: GestureLabel) -> Option<&str> {
        None
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn expected_features(&self) -> usize {
        (**self).expected_features()
    }

    fn classify(&mut self, features: &FeatureVector) -> Result<GestureLabel, ClassifierError> {
        (**self).classify(features)
    }

    fn label_name(&self, label: GestureLabel) -> Option<&str> {
        (**self).label_name(label)
    }
}

/// Comprueba que el vector tenga la longitud que espera el modelo
pub fn check_shape(expected: usize, features: &FeatureVector) -> Result<(), ClassifierError> {
    if features.len() != expected {
        return Err(ClassifierError::ShapeMismatch {
            expected,
            actual: features.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ClassesJson {
    index_to_class: HashMap<String, String>,
}

/// Carga `classes.json` ({"index_to_class": {"0": "UP", ...}}) ordenado por índice
pub fn load_classes(path: impl AsRef<Path>) -> Result<Vec<String>, ClassifierError> {
    let content = fs::read_to_string(path)?;
    let data: ClassesJson = serde_json::from_str(&content)?;

    // Convertir HashMap a Vec ordenado por índice
    let mut pairs: Vec<(usize, String)> = data
        .index_to_class
        .into_iter()
        .filter_map(|(k, v)| k.parse::<usize>().ok().map(|idx| (idx, v)))
        .collect();

    pairs.sort_by_key(|(idx, _)| *idx);
    Ok(pairs.into_iter().map(|(_, name)| name).collect())
}

/// Índice de la clase con mayor puntuación en la primera fila
fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_nan())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx)
}

/// Salida del grafo de la que se lee la predicción
#[derive(Debug, Clone, PartialEq, Eq)]
enum PredictionOutput {
    /// Tensor f32 [1, clases] con probabilidades
    Probabilities(String),
    /// Tensor i64 [1] con la etiqueta
    Label(String),
}

/// Elige la salida de la predicción: la etiqueta i64 si el grafo la trae,
/// si no el argmax de la primera salida f32
fn select_prediction_output<'a>(
    outputs: impl IntoIterator<Item = (&'a str, Option<TensorElementType>)>,
) -> Option<PredictionOutput> {
    let mut probabilities = None;
    for (name, ty) in outputs {
        match ty {
            Some(TensorElementType::Int64) => return Some(PredictionOutput::Label(name.to_string())),
            Some(TensorElementType::Float32) if probabilities.is_none() => {
                probabilities = Some(PredictionOutput::Probabilities(name.to_string()));
            }
            _ => {}
        }
    }
    probabilities
}

fn tensor_element_type(ty: &ValueType) -> Option<TensorElementType> {
    match ty {
        ValueType::Tensor { ty, .. } => Some(*ty),
        _ => None,
    }
}

/// Clasificador SVM exportado a ONNX
pub struct OnnxClassifier {
    session: Session,
    labels: Vec<String>,
    input_name: String,
    output: PredictionOutput,
    expected_features: usize,
}

impl OnnxClassifier {
    pub fn load(
        model_path: impl AsRef<Path>,
        classes_path: Option<&Path>,
        expected_features: usize,
    ) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        let load_error = |reason: String| ClassifierError::ModelLoad {
            path: model_path.display().to_string(),
            reason,
        };

        if !model_path.is_file() {
            return Err(load_error("file not found".to_string()));
        }

        // Cargar clases
        let labels = match classes_path {
            Some(path) => load_classes(path).map_err(|e| load_error(format!("classes: {}", e)))?,
            None => Vec::new(),
        };

        // Cargar modelo ONNX
        let session = Session::builder()
            .map_err(|e| load_error(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| load_error(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or(ClassifierError::MissingIo { kind: "input" })?;

        let output = select_prediction_output(
            session
                .outputs
                .iter()
                .map(|output| (output.name.as_str(), tensor_element_type(&output.output_type))),
        )
        .ok_or(ClassifierError::MissingIo { kind: "output" })?;

        log::info!("🧠 Modelo cargado: {}", model_path.display());
        log::info!("🧠 Clases: {:?}", labels);
        log::debug!("🧠 Input: {} ({} valores)", input_name, expected_features);
        log::debug!("🧠 Output: {:?}", output);

        Ok(Self {
            session,
            labels,
            input_name,
            output,
            expected_features,
        })
    }

    /// Obtiene las etiquetas de clases
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Classifier for OnnxClassifier {
    fn expected_features(&self) -> usize {
        self.expected_features
    }

    fn classify(&mut self, features: &FeatureVector) -> Result<GestureLabel, ClassifierError> {
        check_shape(self.expected_features, features)?;

        // Tensor de entrada [1, N * 6]
        let shape = vec![1_usize, self.expected_features];
        let input_value = Value::from_array((shape, features.as_slice().to_vec()))?;

        let outputs = self.session.run(ort::inputs![
            self.input_name.as_str() => &input_value,
        ])?;

        match &self.output {
            PredictionOutput::Probabilities(name) => {
                let (prob_shape, prob_data) = outputs[name.as_str()].try_extract_tensor::<f32>()?;
                let num_classes = if prob_shape.len() >= 2 {
                    prob_shape[1] as usize
                } else {
                    prob_data.len()
                };
                let first_row = &prob_data[..num_classes.min(prob_data.len())];
                let idx = argmax(first_row).ok_or(ClassifierError::NoOutputTensor)?;
                Ok(GestureLabel(idx as u32))
            }
            PredictionOutput::Label(name) => {
                let (_, label_data) = outputs[name.as_str()].try_extract_tensor::<i64>()?;
                let raw = *label_data.first().ok_or(ClassifierError::NoOutputTensor)?;
                u32::try_from(raw)
                    .map(GestureLabel)
                    .map_err(|_| ClassifierError::InvalidLabel(raw))
            }
        }
    }

    fn label_name(&self, label: GestureLabel) -> Option<&str> {
        self.labels.get(label.0 as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_classes_sorted_by_index() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"index_to_class": {{"2": "RIGHT", "0": "UP", "1": "DOWN", "x": "ignored"}}}}"#
        )
        .unwrap();

        let labels = load_classes(file.path()).unwrap();
        assert_eq!(labels, vec!["UP", "DOWN", "RIGHT"]);
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let err = OnnxClassifier::load("/nonexistent/svm_model.onnx", None, 3000)
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::ModelLoad { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_corrupt_model_is_load_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not an onnx graph").unwrap();

        let err = OnnxClassifier::load(file.path(), None, 3000).err().unwrap();
        assert!(matches!(err, ClassifierError::ModelLoad { .. }));
    }

    #[test]
    fn test_check_shape() {
        let features = FeatureVector::from_values(vec![0.0; 12]);
        assert!(check_shape(12, &features).is_ok());
        let err = check_shape(3000, &features).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(
            err,
            ClassifierError::ShapeMismatch {
                expected: 3000,
                actual: 12
            }
        ));
    }

    #[test]
    fn test_argmax_picks_highest_score() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[f32::NAN, 0.3]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_label_output_preferred_over_probabilities() {
        // Orden habitual de un SVC exportado: probabilidades y etiqueta
        let outputs = [
            ("output_probability", Some(TensorElementType::Float32)),
            ("output_label", Some(TensorElementType::Int64)),
        ];
        assert_eq!(
            select_prediction_output(outputs),
            Some(PredictionOutput::Label("output_label".to_string()))
        );
    }

    #[test]
    fn test_probabilities_used_without_label_output() {
        let outputs = [
            ("scores_map", None),
            ("probabilities", Some(TensorElementType::Float32)),
            ("logits", Some(TensorElementType::Float32)),
        ];
        assert_eq!(
            select_prediction_output(outputs),
            Some(PredictionOutput::Probabilities("probabilities".to_string()))
        );
    }

    #[test]
    fn test_no_usable_output() {
        let outputs = [("names", Some(TensorElementType::String)), ("map", None)];
        assert_eq!(select_prediction_output(outputs), None);
    }
}
