/*!
Autosave demo: a motor record whose setpoint and velocity survive restarts.

Run it twice with the same directory to see the values restored:

    cargo run -p autosave-core --example motor_demo -- /tmp/autosave-demo
*/

use autosave_core::observability::init_observability;
use autosave_core::{AccessorError, Autosave, AutosaveConfig, LoadOutcome, Registry, Value, Variable};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A motor with a position setpoint and a velocity field
#[derive(Default)]
struct Motor {
    state: Mutex<(f64, f64)>,
}

impl Variable for Motor {
    fn value(&self) -> Result<Value, AccessorError> {
        let state = self.state.lock().map_err(|_| AccessorError::Unavailable("poisoned".into()))?;
        Ok(Value::Float(state.0))
    }

    fn set_value(&self, value: Value) -> Result<(), AccessorError> {
        let position = value.as_f64().ok_or(AccessorError::TypeMismatch {
            expected: "float".into(),
            actual: value.kind().into(),
        })?;
        let mut state = self.state.lock().map_err(|_| AccessorError::Unavailable("poisoned".into()))?;
        state.0 = position;
        Ok(())
    }

    fn field(&self, name: &str) -> Result<Value, AccessorError> {
        let state = self.state.lock().map_err(|_| AccessorError::Unavailable("poisoned".into()))?;
        match name {
            "VELO" => Ok(Value::Float(state.1)),
            other => Err(AccessorError::UnknownField(other.to_string())),
        }
    }

    fn set_field(&self, name: &str, value: Value) -> Result<(), AccessorError> {
        let mut state = self.state.lock().map_err(|_| AccessorError::Unavailable("poisoned".into()))?;
        match (name, value.as_f64()) {
            ("VELO", Some(velocity)) => {
                state.1 = velocity;
                Ok(())
            }
            ("VELO", None) => Err(AccessorError::Rejected("velocity must be numeric".into())),
            (other, _) => Err(AccessorError::UnknownField(other.to_string())),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_observability(false)?;

    let dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| std::env::temp_dir().join("autosave-demo").display().to_string());
    std::fs::create_dir_all(&dir)?;

    let config = AutosaveConfig::from_toml(&format!(
        r#"
directory = "{dir}"
poll_interval_ms = 200

[[files]]
name = "motors"
period_secs = 1.0
backup_mode = "single_rotating"
"#
    ))?;

    let mut registry = Registry::new(config)?;
    let motor = Arc::new(Motor::default());
    registry.add_variable(Some("motors"), "m1", motor.clone(), true, &["VELO"])?;

    let autosave = Autosave::new(registry)?;
    if let Ok(LoadOutcome::Loaded(report)) = autosave.load("motors") {
        println!("restored {:?}", report.applied);
    }
    println!("motor before: {:?}", motor.value()?);

    let handle = autosave.start()?;
    for step in 1..=5 {
        motor.set_value(Value::Float(motor.value()?.as_f64().unwrap_or(0.0) + 1.0))?;
        motor.set_field("VELO", Value::Float(step as f64 * 0.5))?;
        std::thread::sleep(Duration::from_millis(300));
    }
    handle.stop_and_wait()?;

    println!("motor after: {:?}, saved to {dir}/motors.softsav", motor.value()?);
    Ok(())
}
