use std::fmt::Display;

use gatesmith_netlist::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimulationError {
    /// The netlist cannot be simulated.
    Netlist(Error),
    UnknownInput(String),
    NotAnInput(String),
    DuplicateInput(String),
    MissingInputs(Vec<String>),
    ValueTooWide { signal: String, width: u32, value: u128 },
    UnknownRegister(String),
    UnknownMemory(String),
    AddressOutOfRange { memory: String, addr: u128 },
    UnknownSignal(String),
}

impl From<Error> for SimulationError {
    fn from(error: Error) -> Self {
        SimulationError::Netlist(error)
    }
}

impl Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SimulationError::Netlist(error) => write!(f, "{error}"),
            SimulationError::UnknownInput(name) => write!(f, "value provided for unknown input {name:?}"),
            SimulationError::NotAnInput(name) => write!(f, "value provided for {name:?}, which is not an input"),
            SimulationError::DuplicateInput(name) => write!(f, "value provided twice for input {name:?}"),
            SimulationError::MissingInputs(names) => {
                write!(f, "no value provided for input")?;
                if names.len() > 1 {
                    write!(f, "s")?;
                }
                for (index, name) in names.iter().enumerate() {
                    write!(f, "{} {name:?}", if index == 0 { "" } else { "," })?;
                }
                Ok(())
            }
            SimulationError::ValueTooWide { signal, width, value } => {
                write!(f, "value {value} for {signal:?} does not fit in {width} bits")
            }
            SimulationError::UnknownRegister(name) => write!(f, "initial value provided for unknown register {name:?}"),
            SimulationError::UnknownMemory(name) => write!(f, "contents provided for unknown memory {name:?}"),
            SimulationError::AddressOutOfRange { memory, addr } => {
                write!(f, "address {addr} is out of range for memory {memory:?}")
            }
            SimulationError::UnknownSignal(name) => write!(f, "cannot trace unknown signal {name:?}"),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Netlist(error) => Some(error),
            _ => None,
        }
    }
}
