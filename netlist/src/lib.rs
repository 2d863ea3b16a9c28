extern crate self as gatesmith_netlist;

mod signal;
mod memory;
mod operation;
mod error;
mod logic;
mod netlist;
mod builder;
mod validate;
mod print;
mod isomorphic;

pub use signal::{bits_for, mask, Role, Signal, SignalId, MAX_WIDTH};
pub use memory::{Memory, MemoryId, MemoryPort, MemoryPorts};
pub use operation::{Opcode, OpcodeSet, OpParam, Operation};
pub use error::{Error, Problem};
pub use netlist::Netlist;
pub use isomorphic::{isomorphic, NotIsomorphic};
