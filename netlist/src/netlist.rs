use std::collections::{btree_map, BTreeMap, BTreeSet};

use crate::error::check;
use crate::{Error, Memory, MemoryId, MemoryPort, MemoryPorts, Opcode, OpcodeSet, Operation, Problem, Role, Signal, SignalId};
use crate::signal::{mask, MAX_WIDTH};

/// The owner of every signal, memory and operation of one circuit.
///
/// Signals and memories live in arenas and are referred to by [`SignalId`] and [`MemoryId`] handles.
/// Operations are kept in a flat list; their position is only meaningful until the next pass rewrites
/// the netlist.
#[derive(Clone, Debug)]
pub struct Netlist {
    signals: Vec<Option<Signal>>,
    names: BTreeMap<String, SignalId>,
    memories: Vec<Memory>,
    operations: Vec<Operation>,
    legal_ops: OpcodeSet,
    next_temp: u32,
}

impl Default for Netlist {
    fn default() -> Self {
        Netlist::new()
    }
}

impl Netlist {
    pub fn new() -> Netlist {
        Netlist {
            signals: vec![],
            names: BTreeMap::new(),
            memories: vec![],
            operations: vec![],
            legal_ops: OpcodeSet::ALL,
            next_temp: 0,
        }
    }

    pub fn legal_ops(&self) -> OpcodeSet {
        self.legal_ops
    }

    pub fn set_legal_ops(&mut self, legal_ops: impl Into<OpcodeSet>) {
        self.legal_ops = legal_ops.into();
    }

    pub(crate) fn signal_problems(signal: &Signal) -> Vec<Problem> {
        let mut problems = vec![];
        if signal.width == 0 || signal.width > MAX_WIDTH {
            problems.push(Problem::InvalidWidth { signal: signal.name.clone(), width: signal.width });
        } else if let Role::Const(value) = signal.role {
            if value & !mask(signal.width) != 0 {
                problems.push(Problem::ConstOutOfRange { signal: signal.name.clone(), width: signal.width, value });
            }
        }
        problems
    }

    pub fn add_signal(&mut self, signal: Signal) -> Result<SignalId, Error> {
        let mut problems = Self::signal_problems(&signal);
        if self.names.contains_key(&signal.name) {
            problems.push(Problem::DuplicateName(signal.name.clone()));
        }
        check(problems)?;
        let id = SignalId(self.signals.len().try_into().map_err(|_| Error::internal("too many signals"))?);
        match self.names.entry(signal.name.clone()) {
            btree_map::Entry::Occupied(_) => unreachable!(),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }
        self.signals.push(Some(signal));
        Ok(id)
    }

    /// Returns a name not used by any signal in the netlist.
    pub fn fresh_name(&mut self, prefix: &str) -> String {
        loop {
            let name = format!("{prefix}{}", self.next_temp);
            self.next_temp += 1;
            if !self.names.contains_key(&name) {
                return name;
            }
        }
    }

    /// Returns `base` if no signal is named that, or a fresh name derived from it otherwise.
    pub fn unique_name(&mut self, base: &str) -> String {
        if self.names.contains_key(base) {
            self.fresh_name(&format!("{base}$"))
        } else {
            base.to_owned()
        }
    }

    pub fn add_input(&mut self, name: impl Into<String>, width: u32) -> Result<SignalId, Error> {
        self.add_signal(Signal::input(name, width))
    }

    pub fn add_output(&mut self, name: impl Into<String>, width: u32) -> Result<SignalId, Error> {
        self.add_signal(Signal::output(name, width))
    }

    pub fn add_register(&mut self, name: impl Into<String>, width: u32) -> Result<SignalId, Error> {
        self.add_signal(Signal::register(name, width))
    }

    pub fn add_named_wire(&mut self, name: impl Into<String>, width: u32) -> Result<SignalId, Error> {
        self.add_signal(Signal::plain(name, width))
    }

    pub fn add_wire(&mut self, width: u32) -> Result<SignalId, Error> {
        let name = self.fresh_name("tmp");
        self.add_signal(Signal { generated: true, ..Signal::plain(name, width) })
    }

    pub fn add_const(&mut self, value: u128, width: u32) -> Result<SignalId, Error> {
        let name = self.fresh_name("const");
        self.add_signal(Signal { generated: true, ..Signal::constant(format!("{name}_{value}"), width, value) })
    }

    pub fn contains_signal(&self, id: SignalId) -> bool {
        matches!(self.signals.get(id.index()), Some(Some(_)))
    }

    pub fn get_signal(&self, id: SignalId) -> Option<&Signal> {
        self.signals.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns the signal for a handle. Panics if the handle does not belong to this netlist.
    pub fn signal(&self, id: SignalId) -> &Signal {
        match self.get_signal(id) {
            Some(signal) => signal,
            None => panic!("{id:?} is not a signal of this netlist"),
        }
    }

    pub fn width(&self, id: SignalId) -> u32 {
        self.signal(id).width
    }

    pub fn find_signal(&self, name: &str) -> Option<SignalId> {
        self.names.get(name).copied()
    }

    /// Renames a signal. The new name must not be in use.
    pub fn rename_signal(&mut self, id: SignalId, name: impl Into<String>) -> Result<(), Error> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(Problem::DuplicateName(name).into());
        }
        let Some(Some(signal)) = self.signals.get_mut(id.index()) else {
            return Err(Error::internal(format!("cannot rename {id:?}: not a signal of this netlist")));
        };
        self.names.remove(&signal.name);
        signal.name = name.clone();
        signal.generated = false;
        self.names.insert(name, id);
        Ok(())
    }

    pub fn signals(&self) -> impl Iterator<Item = (SignalId, &Signal)> {
        self.signals
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|signal| (SignalId(index as u32), signal)))
    }

    pub fn signal_count(&self) -> usize {
        self.signals().count()
    }

    pub(crate) fn arena_len(&self) -> usize {
        self.signals.len()
    }

    fn signals_with_role<'a>(&'a self, f: impl Fn(&Signal) -> bool + 'a) -> impl Iterator<Item = SignalId> + 'a {
        self.signals().filter(move |(_, signal)| f(signal)).map(|(id, _)| id)
    }

    pub fn inputs(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.signals_with_role(Signal::is_input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.signals_with_role(Signal::is_output)
    }

    pub fn registers(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.signals_with_role(Signal::is_register)
    }

    pub fn consts(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.signals_with_role(|signal| signal.as_const().is_some())
    }

    pub fn add_memory(&mut self, memory: Memory) -> Result<MemoryId, Error> {
        let mut problems = vec![];
        for (what, width) in [("data", memory.data_width), ("address", memory.addr_width)] {
            if width == 0 || width > MAX_WIDTH {
                problems.push(Problem::InvalidWidth { signal: format!("{}.{what}", memory.name), width });
            }
        }
        for (&addr, &value) in &memory.init {
            if addr & !mask(memory.addr_width) != 0 || value & !mask(memory.data_width) != 0 {
                problems.push(Problem::ConstOutOfRange {
                    signal: format!("{}[{addr}]", memory.name),
                    width: memory.data_width,
                    value,
                });
            }
        }
        check(problems)?;
        let id = MemoryId(self.memories.len().try_into().map_err(|_| Error::internal("too many memories"))?);
        self.memories.push(memory);
        Ok(id)
    }

    pub fn add_rom(
        &mut self,
        name: impl Into<String>,
        data_width: u32,
        addr_width: u32,
        contents: impl IntoIterator<Item = (u128, u128)>,
    ) -> Result<MemoryId, Error> {
        self.add_memory(Memory::rom(name, data_width, addr_width, contents))
    }

    pub fn get_memory(&self, id: MemoryId) -> Option<&Memory> {
        self.memories.get(id.index())
    }

    /// Returns the memory for a handle. Panics if the handle does not belong to this netlist.
    pub fn memory(&self, id: MemoryId) -> &Memory {
        match self.get_memory(id) {
            Some(memory) => memory,
            None => panic!("{id:?} is not a memory of this netlist"),
        }
    }

    pub fn memories(&self) -> impl Iterator<Item = (MemoryId, &Memory)> {
        self.memories.iter().enumerate().map(|(index, memory)| (MemoryId(index as u32), memory))
    }

    pub fn find_memory(&self, name: &str) -> Option<MemoryId> {
        self.memories().find(|(_, memory)| memory.name == name).map(|(id, _)| id)
    }

    pub fn memory_ports(&self, id: MemoryId) -> MemoryPorts {
        let mut ports = MemoryPorts::default();
        for (index, operation) in self.operations.iter().enumerate() {
            if operation.param.as_memory() != Some(id) {
                continue;
            }
            match operation.op {
                Opcode::MemRead => ports.read_ports.push(index),
                Opcode::MemWrite => ports.write_ports.push(index),
                _ => (),
            }
        }
        ports
    }

    /// Adds an operation after checking it against the signals and memories already in the netlist,
    /// the legal opcode set, and the width rules of its opcode.
    pub fn add_operation(&mut self, operation: Operation) -> Result<(), Error> {
        check(self.operation_problems(&operation))?;
        self.operations.push(operation);
        Ok(())
    }

    /// Allocates a wire and drives it with the operation `build` returns; the wire is released if the
    /// operation is rejected.
    pub(crate) fn add_driven_wire(
        &mut self,
        width: u32,
        build: impl FnOnce(SignalId) -> Operation,
    ) -> Result<SignalId, Error> {
        let dest = self.add_wire(width)?;
        match self.add_operation(build(dest)) {
            Ok(()) => Ok(dest),
            Err(error) => {
                self.remove_signal(dest);
                Err(error)
            }
        }
    }

    pub fn add_memory_port(&mut self, memory: MemoryId, port: MemoryPort) -> Result<(), Error> {
        match port {
            MemoryPort::Read { addr, data } => self.add_operation(Operation::mem_read(memory, addr, data)),
            MemoryPort::Write { addr, data, enable } => {
                self.add_operation(Operation::mem_write(memory, addr, data, enable))
            }
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Replaces the operation at `index`, checking the replacement like [`Netlist::add_operation`].
    pub fn replace_operation(&mut self, index: usize, operation: Operation) -> Result<(), Error> {
        check(self.operation_problems(&operation))?;
        self.operations[index] = operation;
        Ok(())
    }

    pub fn retain_operations(&mut self, mut f: impl FnMut(usize, &Operation) -> bool) {
        let mut index = 0;
        self.operations.retain(|operation| {
            let keep = f(index, operation);
            index += 1;
            keep
        });
    }

    /// Maps every signal to the indices of the operations driving it.
    pub fn drivers(&self) -> BTreeMap<SignalId, Vec<usize>> {
        let mut drivers: BTreeMap<SignalId, Vec<usize>> = BTreeMap::new();
        for (index, operation) in self.operations.iter().enumerate() {
            for &dest in &operation.dests {
                drivers.entry(dest).or_default().push(index);
            }
        }
        drivers
    }

    /// Maps every signal to the operation driving it, assuming the single-driver rule holds.
    pub fn producers(&self) -> BTreeMap<SignalId, usize> {
        let mut producers = BTreeMap::new();
        for (index, operation) in self.operations.iter().enumerate() {
            for &dest in &operation.dests {
                producers.entry(dest).or_insert(index);
            }
        }
        producers
    }

    /// Maps every signal to the indices of the operations reading it.
    pub fn consumers(&self) -> BTreeMap<SignalId, BTreeSet<usize>> {
        let mut consumers: BTreeMap<SignalId, BTreeSet<usize>> = BTreeMap::new();
        for (index, operation) in self.operations.iter().enumerate() {
            for &arg in &operation.args {
                consumers.entry(arg).or_default().insert(index);
            }
        }
        consumers
    }

    pub fn referenced_signals(&self) -> BTreeSet<SignalId> {
        let mut referenced = BTreeSet::new();
        for operation in &self.operations {
            operation.visit(|signal| {
                referenced.insert(signal);
            });
        }
        referenced
    }

    /// Substitutes signals in the arguments of every operation.
    ///
    /// Replacements are followed transitively, so that `a -> b` and `b -> c` rewrite uses of `a` to `c`.
    /// Destinations are never rewritten.
    pub fn replace_signals(&mut self, replacements: &BTreeMap<SignalId, SignalId>) -> Result<(), Error> {
        if replacements.is_empty() {
            return Ok(());
        }
        let mut resolved = BTreeMap::new();
        for &from in replacements.keys() {
            let mut to = from;
            let mut steps = 0;
            while let Some(&next) = replacements.get(&to) {
                to = next;
                steps += 1;
                if steps > replacements.len() {
                    return Err(Error::internal(format!("signal replacement chain from {from:?} is cyclic")));
                }
            }
            if self.width(from) != self.width(to) {
                return Err(Error::internal(format!(
                    "cannot replace {} with {}: widths differ",
                    self.signal(from),
                    self.signal(to)
                )));
            }
            resolved.insert(from, to);
        }
        for operation in self.operations.iter_mut() {
            operation.visit_args_mut(|signal| {
                if let Some(&to) = resolved.get(signal) {
                    *signal = to;
                }
            });
        }
        Ok(())
    }

    /// Removes a signal no operation refers to. Returns whether the signal was removed.
    pub fn remove_signal_if_unreferenced(&mut self, id: SignalId) -> bool {
        if !self.contains_signal(id) || self.operations.iter().any(|op| op.args.contains(&id) || op.dests.contains(&id))
        {
            return false;
        }
        self.remove_signal(id);
        true
    }

    fn remove_signal(&mut self, id: SignalId) {
        if let Some(signal) = self.signals[id.index()].take() {
            self.names.remove(&signal.name);
        }
    }

    /// Removes every signal that is no longer referenced by any operation.
    ///
    /// Unreferenced inputs are kept and their names returned, since they are part of the interface.
    /// An unreferenced output cannot be removed, and is an internal error: a pass disconnected it.
    pub fn remove_unused_signals(&mut self, pass: &str) -> Result<Vec<String>, Error> {
        let referenced = self.referenced_signals();
        let mut unused_inputs = vec![];
        let mut removed = vec![];
        for (id, signal) in self.signals() {
            if referenced.contains(&id) {
                continue;
            }
            match signal.role {
                Role::Input => unused_inputs.push(signal.name.clone()),
                Role::Output => {
                    return Err(Error::internal(format!("output {:?} was disconnected by {pass}", signal.name)));
                }
                _ => removed.push(id),
            }
        }
        for id in removed {
            log::trace!("{pass}: removing unused signal {}", self.signal(id));
            self.remove_signal(id);
        }
        Ok(unused_inputs)
    }

    /// Operation count per opcode.
    pub fn statistics(&self) -> BTreeMap<Opcode, usize> {
        let mut statistics = BTreeMap::new();
        for operation in &self.operations {
            *statistics.entry(operation.op).or_insert(0) += 1;
        }
        statistics
    }
}
