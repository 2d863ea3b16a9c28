use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::SignalId;

/// Handle to a memory owned by a [`Netlist`](crate::Netlist).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryId(pub(crate) u32);

impl MemoryId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "MemoryId({})", self.0)
    }
}

/// An addressable array of `2 ** addr_width` rows, each `data_width` bits wide.
///
/// A memory has no connections of its own; it is accessed through `MemRead` and `MemWrite`
/// operations whose parameter names the memory. Reads are asynchronous (they behave like
/// combinational logic) and writes are synchronous. Unless the memory is marked `asynchronous`,
/// every read address must come straight from registers, inputs or constants, with only
/// buffers, concatenations and selections in between.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Memory {
    pub name: String,
    pub data_width: u32,
    pub addr_width: u32,
    /// Read-only memories cannot have write ports.
    pub read_only: bool,
    pub asynchronous: bool,
    /// Initial contents; rows not listed read as the simulator's default value.
    pub init: BTreeMap<u128, u128>,
}

impl Memory {
    pub fn new(name: impl Into<String>, data_width: u32, addr_width: u32) -> Memory {
        Memory {
            name: name.into(),
            data_width,
            addr_width,
            read_only: false,
            asynchronous: false,
            init: BTreeMap::new(),
        }
    }

    pub fn rom(
        name: impl Into<String>,
        data_width: u32,
        addr_width: u32,
        contents: impl IntoIterator<Item = (u128, u128)>,
    ) -> Memory {
        Memory { read_only: true, init: contents.into_iter().collect(), ..Memory::new(name, data_width, addr_width) }
    }

    pub fn depth(&self) -> u128 {
        if self.addr_width >= u128::BITS {
            u128::MAX
        } else {
            1 << self.addr_width
        }
    }
}

/// Read and write ports of a memory, as operation indices in the netlist's operation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryPorts {
    pub read_ports: Vec<usize>,
    pub write_ports: Vec<usize>,
}

/// A port to be attached to a memory with [`Netlist::add_memory_port`](crate::Netlist::add_memory_port).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryPort {
    Read { addr: SignalId, data: SignalId },
    Write { addr: SignalId, data: SignalId, enable: SignalId },
}
