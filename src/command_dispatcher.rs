use crate::types::GestureLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Distancia por defecto de un desplazamiento (cm)
pub const DEFAULT_MOVE_CM: u32 = 50;

/// Giro por defecto (grados)
pub const DEFAULT_ROTATE_DEGREES: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveDirection {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
}

impl MoveDirection {
    /// Palabra del SDK de texto del dron
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveDirection::Up => "up",
            MoveDirection::Down => "down",
            MoveDirection::Left => "left",
            MoveDirection::Right => "right",
            MoveDirection::Forward => "forward",
            MoveDirection::Back => "back",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotateDirection {
    Clockwise,
    CounterClockwise,
}

impl RotateDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotateDirection::Clockwise => "cw",
            RotateDirection::CounterClockwise => "ccw",
        }
    }
}

/// Descriptor de comando: no ejecuta nada, solo describe qué hacer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    Move { direction: MoveDirection, cm: u32 },
    Rotate { direction: RotateDirection, degrees: u32 },
    Land,
}

impl CommandAction {
    pub fn is_land(&self) -> bool {
        matches!(self, CommandAction::Land)
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandAction::Move { direction, cm } => write!(f, "{} {}", direction.as_str(), cm),
            CommandAction::Rotate { direction, degrees } => {
                write!(f, "{} {}", direction.as_str(), degrees)
            }
            CommandAction::Land => write!(f, "land"),
        }
    }
}

/// Acción tal como se escribe en la configuración
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
    RotateCw,
    RotateCcw,
    Land,
}

impl ActionKind {
    /// Construye el descriptor; `amount` es cm o grados según la acción
    pub fn to_action(self, amount: Option<u32>) -> CommandAction {
        let cm = amount.unwrap_or(DEFAULT_MOVE_CM);
        let degrees = amount.unwrap_or(DEFAULT_ROTATE_DEGREES);
        let moving = |direction| CommandAction::Move { direction, cm };

        match self {
            ActionKind::Up => moving(MoveDirection::Up),
            ActionKind::Down => moving(MoveDirection::Down),
            ActionKind::Left => moving(MoveDirection::Left),
            ActionKind::Right => moving(MoveDirection::Right),
            ActionKind::Forward => moving(MoveDirection::Forward),
            ActionKind::Back => moving(MoveDirection::Back),
            ActionKind::RotateCw => CommandAction::Rotate {
                direction: RotateDirection::Clockwise,
                degrees,
            },
            ActionKind::RotateCcw => CommandAction::Rotate {
                direction: RotateDirection::CounterClockwise,
                degrees,
            },
            ActionKind::Land => CommandAction::Land,
        }
    }
}

/// Una entrada de la tabla etiqueta -> acción
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureBinding {
    pub label: GestureLabel,
    pub name: String,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
}

impl GestureBinding {
    pub fn new(label: u32, name: &str, action: ActionKind) -> Self {
        Self {
            label: GestureLabel(label),
            name: name.to_string(),
            action,
            amount: None,
        }
    }
}

/// Tabla con la que se entrenó el modelo del mando
pub fn default_bindings() -> Vec<GestureBinding> {
    vec![
        GestureBinding::new(0, "UP", ActionKind::Up),
        GestureBinding::new(1, "DOWN", ActionKind::Down),
        GestureBinding::new(2, "RIGHT", ActionKind::Right),
        GestureBinding::new(3, "LEFT", ActionKind::Left),
        GestureBinding::new(4, "FRONT", ActionKind::Forward),
        GestureBinding::new(5, "BACK", ActionKind::Back),
        GestureBinding::new(6, "ROTATE LEFT", ActionKind::RotateCcw),
        GestureBinding::new(7, "ROTATE RIGHT", ActionKind::RotateCw),
        GestureBinding::new(8, "LAND", ActionKind::Land),
    ]
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchTableError {
    #[error("Gesture label {0} is bound more than once")]
    DuplicateLabel(GestureLabel),
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    action: CommandAction,
}

/// Tabla fija etiqueta -> acción. Una etiqueta es terminal si su acción es aterrizar.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    table: BTreeMap<GestureLabel, Entry>,
}

impl CommandDispatcher {
    pub fn new(bindings: &[GestureBinding]) -> Result<Self, DispatchTableError> {
        let mut table = BTreeMap::new();
        for (label, entry) in bindings.iter().map(table_entry) {
            if table.insert(label, entry).is_some() {
                return Err(DispatchTableError::DuplicateLabel(label));
            }
        }
        Ok(Self { table })
    }

    pub fn dispatch(&self, label: GestureLabel) -> Option<CommandAction> {
        self.table.get(&label).map(|entry| entry.action)
    }

    pub fn is_terminal(&self, label: GestureLabel) -> bool {
        self.dispatch(label).is_some_and(|action| action.is_land())
    }

    pub fn name(&self, label: GestureLabel) -> Option<&str> {
        self.table.get(&label).map(|entry| entry.name.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = GestureLabel> + '_ {
        self.table.keys().copied()
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        // Etiquetas únicas: la tabla por defecto no puede fallar
        let table = default_bindings().iter().map(table_entry).collect();
        Self { table }
    }
}

fn table_entry(binding: &GestureBinding) -> (GestureLabel, Entry) {
    let entry = Entry {
        name: binding.name.clone(),
        action: binding.action.to_action(binding.amount),
    };
    (binding.label, entry)
}
