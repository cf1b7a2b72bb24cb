mod common;

use std::time::Duration;

use common::{sample, Event, FakeVehicle, FixedClassifier, ScriptedSource};
use crossbeam_channel::{unbounded, Receiver};
use gesture_pilot::command_dispatcher::{ActionKind, CommandDispatcher, GestureBinding};
use gesture_pilot::flight_session::{
    CycleError, CycleOutcome, FlightSession, LandOutcome, SessionSettings, SessionState,
};
use gesture_pilot::trigger::Trigger;
use gesture_pilot::types::{GestureLabel, AXES};
use gesture_pilot::window_collector::WindowCollector;

const ROWS: usize = 8;

fn collector() -> WindowCollector {
    WindowCollector::new(Duration::from_millis(15)).with_poll_quantum(Duration::from_millis(2))
}

fn settings() -> SessionSettings {
    SessionSettings {
        rows: ROWS,
        ..SessionSettings::default()
    }
}

fn build(
    vehicle: &FakeVehicle,
    source: ScriptedSource,
    labels: Vec<u32>,
) -> FlightSession<FakeVehicle, ScriptedSource, FixedClassifier> {
    FlightSession::new(
        vehicle.clone(),
        source,
        FixedClassifier::new(labels, ROWS * AXES),
        CommandDispatcher::default(),
    )
    .with_collector(collector())
    .with_settings(settings())
}

fn next_triggers(count: usize) -> Receiver<Trigger> {
    let (tx, rx) = unbounded();
    for _ in 0..count {
        tx.send(Trigger::Next).unwrap();
    }
    rx
}

#[test]
fn land_gesture_is_terminal() {
    let vehicle = FakeVehicle::new();
    let mut session = build(&vehicle, ScriptedSource::steady(sample(1.0)), vec![4, 8]);

    let report = session.run(&next_triggers(10));

    assert_eq!(report.final_state, SessionState::Landed);
    assert_eq!(report.land_outcome, LandOutcome::Landed);
    assert_eq!(report.cycles, 2);
    assert_eq!(report.gestures[1].label, GestureLabel(8));
    assert_eq!(report.gestures[1].name.as_deref(), Some("LAND"));

    // No se vuelve a leer ni a despachar tras aterrizar
    assert!(matches!(
        session.run_cycle(),
        Err(CycleError::NotFlying(SessionState::Landed))
    ));
    drop(session);

    assert_eq!(
        vehicle.calls(),
        vec!["connect", "battery", "calibrate", "takeoff", "forward 50", "land", "end"]
    );
}

#[test]
fn disconnect_mid_collection_lands_once_and_faults() {
    let vehicle = FakeVehicle::new();
    let source = ScriptedSource::new(vec![
        Event::Sample(sample(1.0)),
        Event::Sample(sample(2.0)),
        Event::Disconnect,
    ]);
    let mut session = build(&vehicle, source, vec![0]);

    let report = session.run(&next_triggers(10));
    drop(session);

    assert_eq!(report.final_state, SessionState::Faulted);
    assert_eq!(report.land_outcome, LandOutcome::Landed);
    assert!(report.fault.unwrap().contains("disconnected"));
    assert_eq!(vehicle.count("land"), 1);
    assert_eq!(vehicle.count("end"), 1);
    assert_eq!(vehicle.calls().last().map(String::as_str), Some("end"));
}

#[test]
fn cancellation_while_waiting_lands_exactly_once() {
    let vehicle = FakeVehicle::new();
    let mut session = build(&vehicle, ScriptedSource::steady(sample(1.0)), vec![0]);
    let cancel = session.cancel_token();

    // Nadie envía disparos: el bucle queda esperando hasta la cancelación
    let (_tx, rx) = unbounded::<Trigger>();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        cancel.cancel();
        cancel.cancel();
    });

    let report = session.run(&rx);
    canceller.join().unwrap();
    drop(session);

    assert_eq!(report.final_state, SessionState::Landed);
    assert_eq!(report.cycles, 0);
    assert_eq!(vehicle.count("land"), 1);
    assert_eq!(vehicle.count("end"), 1);
}

#[test]
fn cancellation_inside_window_lands_once() {
    let vehicle = FakeVehicle::new();
    let mut session = FlightSession::new(
        vehicle.clone(),
        ScriptedSource::steady(sample(1.0)),
        FixedClassifier::new(vec![0], ROWS * AXES),
        CommandDispatcher::default(),
    )
    .with_collector(
        WindowCollector::new(Duration::from_secs(10)).with_poll_quantum(Duration::from_millis(2)),
    )
    .with_settings(settings());
    let cancel = session.cancel_token();

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });

    let report = session.run(&next_triggers(1));
    canceller.join().unwrap();

    assert_eq!(report.final_state, SessionState::Landed);
    assert_eq!(report.cycles, 1);
    assert!(report.gestures.is_empty());
    assert_eq!(vehicle.count("land"), 1);
}

#[test]
fn unmapped_label_sends_nothing() {
    let vehicle = FakeVehicle::new();
    let mut session = build(&vehicle, ScriptedSource::steady(sample(1.0)), vec![42]);
    session.connect().unwrap();
    session.take_off().unwrap();

    let outcome = session.run_cycle().unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Unmapped {
            label: GestureLabel(42)
        }
    );
    assert_eq!(session.state(), SessionState::Flying);
    assert_eq!(
        vehicle.calls(),
        vec!["connect", "battery", "calibrate", "takeoff"]
    );
}

#[test]
fn repeated_empty_windows_escalate_to_fault() {
    let vehicle = FakeVehicle::new();
    // Solo registros malformados: todas las ventanas salen vacías
    let source = ScriptedSource::new(vec![Event::Malformed; 200]);
    let mut session = build(&vehicle, source, vec![0]);

    let report = session.run(&next_triggers(10));

    assert_eq!(report.final_state, SessionState::Faulted);
    assert_eq!(report.cycles, 3);
    assert!(report.fault.unwrap().contains("3 consecutive"));
    assert_eq!(vehicle.count("land"), 1);
}

#[test]
fn lost_vehicle_link_faults() {
    let vehicle = FakeVehicle {
        lose_link_on_move: true,
        ..FakeVehicle::new()
    };
    let mut session = build(&vehicle, ScriptedSource::steady(sample(1.0)), vec![1]);

    let report = session.run(&next_triggers(5));
    drop(session);

    assert_eq!(report.final_state, SessionState::Faulted);
    assert_eq!(report.cycles, 1);
    assert_eq!(vehicle.count("land"), 1);
}

#[test]
fn failed_landing_is_reported_not_retried() {
    let vehicle = FakeVehicle {
        fail_land: true,
        ..FakeVehicle::new()
    };
    let mut session = build(&vehicle, ScriptedSource::steady(sample(1.0)), vec![8]);

    let report = session.run(&next_triggers(3));
    drop(session);

    assert_eq!(report.final_state, SessionState::Faulted);
    assert!(matches!(report.land_outcome, LandOutcome::Failed(_)));
    assert_eq!(vehicle.count("land"), 1);
    assert_eq!(vehicle.count("end"), 1);
}

#[test]
fn low_battery_never_takes_off() {
    let vehicle = FakeVehicle {
        battery: 4,
        ..FakeVehicle::new()
    };
    let mut session = build(&vehicle, ScriptedSource::steady(sample(1.0)), vec![0]);

    let report = session.run(&next_triggers(1));

    assert_eq!(report.final_state, SessionState::Faulted);
    assert_eq!(report.land_outcome, LandOutcome::NotAttempted);
    assert_eq!(vehicle.count("takeoff"), 0);
    assert_eq!(vehicle.count("land"), 0);
}

#[test]
fn custom_table_and_closed_trigger_channel() {
    let vehicle = FakeVehicle::new();
    let mut spin = GestureBinding::new(0, "SPIN", ActionKind::RotateCcw);
    spin.amount = Some(90);
    let dispatcher = CommandDispatcher::new(&[spin]).unwrap();

    let mut session = FlightSession::new(
        vehicle.clone(),
        ScriptedSource::steady(sample(1.0)),
        FixedClassifier::new(vec![0], ROWS * AXES),
        dispatcher,
    )
    .with_collector(collector())
    .with_settings(settings());

    // Dos disparos y el emisor se cierra: se aterriza como con Stop
    let rx = next_triggers(2);
    let report = session.run(&rx);

    assert_eq!(report.final_state, SessionState::Landed);
    assert_eq!(report.cycles, 2);
    assert_eq!(vehicle.count("ccw 90"), 2);
    assert_eq!(vehicle.count("land"), 1);
}
