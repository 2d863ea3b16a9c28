mod error;
mod trace;
mod simulator;

pub use error::SimulationError;
pub use trace::{SignalValues, SimulationTrace, TraceSelection, Tracer};
pub use simulator::{Simulation, SimulationOptions};
