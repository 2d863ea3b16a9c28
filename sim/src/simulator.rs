use std::collections::{BTreeMap, BTreeSet};

use gatesmith_netlist::{mask, Error, MemoryId, Netlist, Opcode, Role, SignalId};

use crate::{SignalValues, SimulationError, SimulationTrace, TraceSelection, Tracer};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulationOptions {
    /// Value of registers and memory rows that are not otherwise initialized, truncated to their width.
    pub default_value: u128,
    /// Initial register values, by register name.
    pub register_values: BTreeMap<String, u128>,
    /// Initial memory contents, by memory name and address. Overrides the memory's own contents.
    pub memory_values: BTreeMap<String, BTreeMap<u128, u128>>,
    pub traced: TraceSelection,
}

/// Cycle-based interpreter for a netlist.
///
/// Each [`step`](Simulation::step) is one clock cycle. It first performs the register updates and
/// memory writes captured at the end of the previous cycle, then evaluates the combinational logic
/// for the provided inputs, and finally captures the values registers and enabled write ports will
/// commit at the next clock edge. On the first cycle there is no preceding edge: registers hold
/// their initial values and memories their initial contents.
///
/// Combinational operations run as soon as all of their arguments are resolved; inputs, constants
/// and registers are resolved from the start of the cycle.
pub struct Simulation<'a, T: Tracer = SimulationTrace> {
    netlist: &'a Netlist,
    /// Indices of the combinational operations.
    combinational: Vec<usize>,
    /// Per operation, the number of arguments that are not resolved at the start of a cycle.
    unresolved_args: Vec<usize>,
    /// Per signal, the combinational operations reading it.
    readers: Vec<Vec<usize>>,
    values: Vec<u128>,
    memories: Vec<BTreeMap<u128, u128>>,
    next_registers: Vec<(SignalId, u128)>,
    pending_writes: Vec<(MemoryId, u128, u128)>,
    default_value: u128,
    cycle: usize,
    tracer: T,
}

impl<'a> Simulation<'a> {
    /// Creates a simulation recording the signals selected by `options.traced`.
    pub fn new(netlist: &'a Netlist, options: SimulationOptions) -> Result<Self, SimulationError> {
        let tracer = SimulationTrace::new(options.traced.clone());
        Simulation::with_tracer(netlist, options, tracer)
    }

    pub fn trace(&self) -> &SimulationTrace {
        &self.tracer
    }
}

impl<'a, T: Tracer> Simulation<'a, T> {
    pub fn with_tracer(
        netlist: &'a Netlist,
        options: SimulationOptions,
        mut tracer: T,
    ) -> Result<Self, SimulationError> {
        netlist.validate()?;
        // Report combinational cycles here rather than on the first step.
        netlist.dependency_order()?;

        let arena_len = netlist.signals().map(|(id, _)| id.index() + 1).max().unwrap_or(0);
        let mut combinational = vec![];
        let mut unresolved_args = vec![0; netlist.operation_count()];
        let mut readers = vec![vec![]; arena_len];
        for (index, operation) in netlist.operations().iter().enumerate() {
            if !operation.op.is_combinational() {
                continue;
            }
            combinational.push(index);
            for &arg in &operation.args {
                let signal = netlist.signal(arg);
                if !(signal.is_terminal() || signal.is_register()) {
                    unresolved_args[index] += 1;
                    readers[arg.index()].push(index);
                }
            }
        }

        let mut values = vec![0; arena_len];
        for (id, signal) in netlist.signals() {
            match signal.role {
                Role::Const(value) => values[id.index()] = value,
                Role::Register => values[id.index()] = options.default_value & signal.mask(),
                _ => (),
            }
        }
        for (name, &value) in &options.register_values {
            let Some(id) = netlist.find_signal(name).filter(|&id| netlist.signal(id).is_register()) else {
                return Err(SimulationError::UnknownRegister(name.clone()));
            };
            values[id.index()] = check_width(netlist, id, value)?;
        }

        let mut memories: Vec<BTreeMap<u128, u128>> =
            netlist.memories().map(|(_, memory)| memory.init.clone()).collect();
        for (name, contents) in &options.memory_values {
            let Some(id) = netlist.find_memory(name) else {
                return Err(SimulationError::UnknownMemory(name.clone()));
            };
            let memory = netlist.memory(id);
            for (&addr, &value) in contents {
                if addr & !mask(memory.addr_width) != 0 {
                    return Err(SimulationError::AddressOutOfRange { memory: name.clone(), addr });
                }
                if value & !mask(memory.data_width) != 0 {
                    return Err(SimulationError::ValueTooWide {
                        signal: format!("{name}[{addr}]"),
                        width: memory.data_width,
                        value,
                    });
                }
                memories[id.index()].insert(addr, value);
            }
        }

        tracer.start(netlist)?;
        log::debug!(
            "simulation: {} operations, {} registers, {} memories",
            netlist.operation_count(),
            netlist.registers().count(),
            memories.len()
        );
        Ok(Simulation {
            netlist,
            combinational,
            unresolved_args,
            readers,
            values,
            memories,
            next_registers: vec![],
            pending_writes: vec![],
            default_value: options.default_value,
            cycle: 0,
            tracer,
        })
    }

    /// Checks that `inputs` provides exactly one value for every input of the netlist.
    fn check_inputs<'b>(
        &self,
        inputs: impl IntoIterator<Item = (&'b str, u128)>,
    ) -> Result<Vec<(SignalId, u128)>, SimulationError> {
        let mut provided = BTreeSet::new();
        let mut result = vec![];
        for (name, value) in inputs {
            let Some(id) = self.netlist.find_signal(name) else {
                return Err(SimulationError::UnknownInput(name.to_owned()));
            };
            if !self.netlist.signal(id).is_input() {
                return Err(SimulationError::NotAnInput(name.to_owned()));
            }
            if !provided.insert(id) {
                return Err(SimulationError::DuplicateInput(name.to_owned()));
            }
            result.push((id, check_width(self.netlist, id, value)?));
        }
        let missing: Vec<String> = self
            .netlist
            .inputs()
            .filter(|id| !provided.contains(id))
            .map(|id| self.netlist.signal(id).name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(SimulationError::MissingInputs(missing));
        }
        Ok(result)
    }

    /// Simulates one clock cycle with the given input values, by input name.
    ///
    /// Malformed input sets are rejected before any state changes.
    pub fn step<'b>(&mut self, inputs: impl IntoIterator<Item = (&'b str, u128)>) -> Result<(), SimulationError> {
        let inputs = self.check_inputs(inputs)?;

        for (register, value) in std::mem::take(&mut self.next_registers) {
            self.values[register.index()] = value;
        }
        for (memory, addr, data) in std::mem::take(&mut self.pending_writes) {
            self.memories[memory.index()].insert(addr, data);
        }
        for (input, value) in inputs {
            self.values[input.index()] = value;
        }

        let netlist = self.netlist;
        let mut unresolved_args = self.unresolved_args.clone();
        let mut ready: Vec<usize> =
            self.combinational.iter().copied().filter(|&index| unresolved_args[index] == 0).collect();
        let mut evaluated = 0;
        while let Some(index) = ready.pop() {
            let dest = netlist.operations()[index].dests[0];
            let value = self.evaluate(index)?;
            self.values[dest.index()] = value;
            evaluated += 1;
            for &reader in &self.readers[dest.index()] {
                unresolved_args[reader] -= 1;
                if unresolved_args[reader] == 0 {
                    ready.push(reader);
                }
            }
        }
        if evaluated != self.combinational.len() {
            let stuck: Vec<String> = self
                .combinational
                .iter()
                .filter(|&&index| unresolved_args[index] != 0)
                .map(|&index| netlist.display_operation(&netlist.operations()[index]).to_string())
                .collect();
            return Err(Error::internal(format!("operations never became ready: {}", stuck.join("; "))).into());
        }

        for operation in netlist.operations() {
            match operation.op {
                Opcode::Reg => {
                    let dest = operation.dests[0];
                    let value = self.values[operation.args[0].index()] & mask(netlist.width(dest));
                    self.next_registers.push((dest, value));
                }
                Opcode::MemWrite => {
                    let [addr, data, enable] = operation.args[..] else { continue };
                    if self.values[enable.index()] & 1 == 0 {
                        continue;
                    }
                    let Some(memory) = operation.param.as_memory() else { continue };
                    // Later ports in operation order overwrite earlier ones.
                    self.pending_writes.push((memory, self.values[addr.index()], self.values[data.index()]));
                }
                _ => (),
            }
        }

        log::trace!("simulation: cycle {} done", self.cycle);
        self.tracer.record(self.cycle, &SignalValues { netlist, values: &self.values });
        self.cycle += 1;
        Ok(())
    }

    fn evaluate(&self, index: usize) -> Result<u128, Error> {
        let netlist = self.netlist;
        let operation = &netlist.operations()[index];
        let dest_width = netlist.width(operation.dests[0]);
        if operation.op == Opcode::MemRead {
            let (memory, addr) = self.read_port(index)?;
            let data_width = netlist.memory(memory).data_width;
            let data = match self.memories[memory.index()].get(&addr) {
                Some(&data) => data,
                None => self.default_value & mask(data_width),
            };
            return Ok(data & mask(dest_width));
        }
        let args: Vec<u128> = operation.args.iter().map(|arg| self.values[arg.index()]).collect();
        let widths: Vec<u32> = operation.args.iter().map(|&arg| netlist.width(arg)).collect();
        operation
            .evaluate(&args, &widths, dest_width)
            .ok_or_else(|| Error::internal(format!("cannot evaluate `{}`", netlist.display_operation(operation))))
    }

    fn read_port(&self, index: usize) -> Result<(MemoryId, u128), Error> {
        let operation = &self.netlist.operations()[index];
        match operation.param.as_memory() {
            Some(memory) => Ok((memory, self.values[operation.args[0].index()])),
            None => Err(Error::internal(format!(
                "memory read `{}` has no memory",
                self.netlist.display_operation(operation)
            ))),
        }
    }

    /// Number of cycles simulated so far.
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    /// Value of a signal during the last simulated cycle, or its initial value if no cycle has been
    /// simulated yet.
    pub fn value(&self, name: &str) -> Option<u128> {
        self.netlist.find_signal(name).map(|id| self.values[id.index()])
    }

    /// Value a register takes at the next clock edge.
    pub fn next_register_value(&self, name: &str) -> Option<u128> {
        let id = self.netlist.find_signal(name).filter(|&id| self.netlist.signal(id).is_register())?;
        match self.next_registers.iter().find(|&&(register, _)| register == id) {
            Some(&(_, value)) => Some(value),
            None => Some(self.values[id.index()]),
        }
    }

    /// Contents of a memory row as seen by read ports in the last simulated cycle.
    pub fn memory_value(&self, name: &str, addr: u128) -> Option<u128> {
        let id = self.netlist.find_memory(name)?;
        let data_width = self.netlist.memory(id).data_width;
        Some(self.memories[id.index()].get(&addr).copied().unwrap_or(self.default_value & mask(data_width)))
    }

    pub fn tracer(&self) -> &T {
        &self.tracer
    }

    pub fn into_tracer(self) -> T {
        self.tracer
    }
}

fn check_width(netlist: &Netlist, id: SignalId, value: u128) -> Result<u128, SimulationError> {
    let signal = netlist.signal(id);
    if value & !signal.mask() != 0 {
        return Err(SimulationError::ValueTooWide { signal: signal.name.clone(), width: signal.width, value });
    }
    Ok(value)
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use gatesmith_netlist::{Error, Memory, Netlist, Opcode, Operation, Problem};

    use crate::{SimulationError, TraceSelection};

    use super::{Simulation, SimulationOptions};

    const NO_INPUTS: [(&str, u128); 0] = [];

    fn counter(width: u32) -> Netlist {
        let mut nl = Netlist::new();
        let count = nl.add_register("count", width).unwrap();
        let one = nl.add_const(1, width).unwrap();
        let y = nl.add_output("y", width).unwrap();
        let sum = nl.add_add(count, one).unwrap();
        let bits: Vec<u32> = (0..width).collect();
        let next = nl.add_select(sum, bits).unwrap();
        nl.set_next(count, next).unwrap();
        nl.connect(y, count).unwrap();
        nl
    }

    #[test]
    fn test_counter() {
        let nl = counter(3);
        let mut sim = Simulation::new(&nl, SimulationOptions::default()).unwrap();
        for cycle in 0..10u128 {
            sim.step(NO_INPUTS).unwrap();
            assert_eq!(sim.value("y"), Some(cycle % 8));
            assert_eq!(sim.next_register_value("count"), Some((cycle + 1) % 8));
        }
        assert_eq!(sim.trace().values("count").unwrap(), &[0, 1, 2, 3, 4, 5, 6, 7, 0, 1]);
        assert_eq!(sim.trace().len(), 10);
    }

    #[test]
    fn test_full_adder() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 1).unwrap();
        let b = nl.add_input("b", 1).unwrap();
        let c = nl.add_input("c", 1).unwrap();
        let ab = nl.add_xor(a, b).unwrap();
        let sum = nl.add_xor(ab, c).unwrap();
        let and_ab = nl.add_and(a, b).unwrap();
        let and_ac = nl.add_and(a, c).unwrap();
        let and_bc = nl.add_and(b, c).unwrap();
        let or_abc = nl.add_or(and_ab, and_ac).unwrap();
        let cout = nl.add_or(or_abc, and_bc).unwrap();
        let total = nl.add_concat([cout, sum]).unwrap();
        let y = nl.add_output("y", 2).unwrap();
        nl.connect(y, total).unwrap();
        assert_eq!(nl.validate(), Ok(()));

        let mut sim = Simulation::new(&nl, SimulationOptions::default()).unwrap();
        for inputs in 0..8u128 {
            let (a, b, c) = (inputs & 1, inputs >> 1 & 1, inputs >> 2);
            sim.step([("a", a), ("b", b), ("c", c)]).unwrap();
            assert_eq!(sim.value("y"), Some(a + b + c), "{a} + {b} + {c}");
        }
    }

    #[test]
    fn test_resolves_by_readiness() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 3).unwrap();
        let b = nl.add_input("b", 3).unwrap();
        let t = nl.add_named_wire("t", 3).unwrap();
        let u = nl.add_named_wire("u", 3).unwrap();
        let y = nl.add_output("y", 3).unwrap();
        // Consumers are declared before their producers.
        nl.add_operation(Operation::new(Opcode::Not, [u], y)).unwrap();
        nl.add_operation(Operation::new(Opcode::Xor, [t, b], u)).unwrap();
        nl.add_operation(Operation::new(Opcode::And, [a, b], t)).unwrap();
        let mut sim = Simulation::new(&nl, SimulationOptions::default()).unwrap();
        for (a, b) in [(0, 0), (5, 3), (7, 6)] {
            sim.step([("a", a), ("b", b)]).unwrap();
            assert_eq!(sim.value("y"), Some(!((a & b) ^ b) & 7));
        }
    }

    #[test]
    fn test_rejects_combinational_loop() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 1).unwrap();
        let t = nl.add_named_wire("t", 1).unwrap();
        let u = nl.add_named_wire("u", 1).unwrap();
        let y = nl.add_output("y", 1).unwrap();
        nl.add_operation(Operation::new(Opcode::And, [a, u], t)).unwrap();
        nl.add_operation(Operation::new(Opcode::Not, [t], u)).unwrap();
        nl.connect(y, t).unwrap();
        assert!(matches!(
            Simulation::new(&nl, SimulationOptions::default()),
            Err(SimulationError::Netlist(Error::Invalid(problems)))
                if matches!(problems[..], [Problem::CombinationalCycle { .. }])
        ));
    }

    #[test]
    fn test_initial_register_value() {
        let nl = counter(4);
        let options = SimulationOptions {
            register_values: BTreeMap::from([("count".to_owned(), 14)]),
            ..SimulationOptions::default()
        };
        let mut sim = Simulation::new(&nl, options).unwrap();
        assert_eq!(sim.next_register_value("count"), Some(14));
        sim.step(NO_INPUTS).unwrap();
        sim.step(NO_INPUTS).unwrap();
        sim.step(NO_INPUTS).unwrap();
        assert_eq!(sim.trace().values("y").unwrap(), &[14, 15, 0]);

        let options = SimulationOptions {
            register_values: BTreeMap::from([("y".to_owned(), 1)]),
            ..SimulationOptions::default()
        };
        assert!(matches!(Simulation::new(&nl, options), Err(SimulationError::UnknownRegister(_))));
        let options = SimulationOptions {
            register_values: BTreeMap::from([("count".to_owned(), 16)]),
            ..SimulationOptions::default()
        };
        assert!(matches!(Simulation::new(&nl, options), Err(SimulationError::ValueTooWide { .. })));
    }

    #[test]
    fn test_input_errors() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 2).unwrap();
        let b = nl.add_input("b", 2).unwrap();
        let y = nl.add_output("y", 2).unwrap();
        let x = nl.add_xor(a, b).unwrap();
        nl.connect(y, x).unwrap();
        let mut sim = Simulation::new(&nl, SimulationOptions::default()).unwrap();
        assert_eq!(sim.step([("a", 1)]), Err(SimulationError::MissingInputs(vec!["b".to_owned()])));
        assert_eq!(sim.step([("a", 1), ("b", 1), ("c", 1)]), Err(SimulationError::UnknownInput("c".to_owned())));
        assert_eq!(sim.step([("a", 1), ("b", 1), ("y", 1)]), Err(SimulationError::NotAnInput("y".to_owned())));
        assert_eq!(sim.step([("a", 1), ("a", 1)]), Err(SimulationError::DuplicateInput("a".to_owned())));
        assert!(matches!(sim.step([("a", 4), ("b", 0)]), Err(SimulationError::ValueTooWide { width: 2, .. })));
        assert_eq!(sim.cycle(), 0);
        assert!(sim.trace().is_empty());
        sim.step([("a", 1), ("b", 3)]).unwrap();
        assert_eq!(sim.value("y"), Some(2));
    }

    #[test]
    fn test_memory() {
        let mut nl = Netlist::new();
        let mem = nl.add_memory(Memory::new("mem", 8, 2)).unwrap();
        let addr = nl.add_input("addr", 2).unwrap();
        let data = nl.add_input("data", 8).unwrap();
        let we = nl.add_input("we", 1).unwrap();
        let q = nl.add_output("q", 8).unwrap();
        let read = nl.add_mem_read(mem, addr).unwrap();
        nl.connect(q, read).unwrap();
        nl.add_mem_write(mem, addr, data, we).unwrap();
        let options = SimulationOptions {
            default_value: 0x1ff,
            memory_values: BTreeMap::from([("mem".to_owned(), BTreeMap::from([(1, 42)]))]),
            ..SimulationOptions::default()
        };
        let mut sim = Simulation::new(&nl, options).unwrap();
        sim.step([("addr", 1), ("data", 7), ("we", 1)]).unwrap();
        // The write lands at the next clock edge.
        assert_eq!(sim.value("q"), Some(42));
        sim.step([("addr", 1), ("data", 9), ("we", 0)]).unwrap();
        assert_eq!(sim.value("q"), Some(7));
        sim.step([("addr", 2), ("data", 0), ("we", 0)]).unwrap();
        assert_eq!(sim.value("q"), Some(0xff));
        assert_eq!(sim.memory_value("mem", 1), Some(7));
    }

    #[test]
    fn test_write_ports_in_order() {
        let mut nl = Netlist::new();
        let mem = nl.add_memory(Memory::new("mem", 4, 1)).unwrap();
        let addr = nl.add_input("addr", 1).unwrap();
        let first = nl.add_const(3, 4).unwrap();
        let second = nl.add_const(5, 4).unwrap();
        let we = nl.add_const(1, 1).unwrap();
        let q = nl.add_output("q", 4).unwrap();
        nl.add_mem_write(mem, addr, first, we).unwrap();
        nl.add_mem_write(mem, addr, second, we).unwrap();
        let read = nl.add_mem_read(mem, addr).unwrap();
        nl.connect(q, read).unwrap();
        let mut sim = Simulation::new(&nl, SimulationOptions::default()).unwrap();
        sim.step([("addr", 0)]).unwrap();
        sim.step([("addr", 0)]).unwrap();
        assert_eq!(sim.value("q"), Some(5));
    }

    #[test]
    fn test_rom() {
        let mut nl = Netlist::new();
        let rom = nl.add_rom("rom", 4, 2, [(0, 1), (1, 2), (2, 4)]).unwrap();
        let addr = nl.add_input("addr", 2).unwrap();
        let q = nl.add_output("q", 4).unwrap();
        let read = nl.add_mem_read(rom, addr).unwrap();
        nl.connect(q, read).unwrap();
        let mut sim = Simulation::new(&nl, SimulationOptions::default()).unwrap();
        for (addr, expect) in [(0, 1), (1, 2), (2, 4), (3, 0)] {
            sim.step([("addr", addr)]).unwrap();
            assert_eq!(sim.value("q"), Some(expect));
        }

        let options = SimulationOptions {
            memory_values: BTreeMap::from([("rom".to_owned(), BTreeMap::from([(4, 1)]))]),
            ..SimulationOptions::default()
        };
        assert!(matches!(Simulation::new(&nl, options), Err(SimulationError::AddressOutOfRange { addr: 4, .. })));
    }

    #[test]
    fn test_trace_selection() {
        let nl = counter(2);
        let options = SimulationOptions {
            traced: TraceSelection::Signals(vec!["y".to_owned()]),
            ..SimulationOptions::default()
        };
        let mut sim = Simulation::new(&nl, options).unwrap();
        sim.step(NO_INPUTS).unwrap();
        sim.step(NO_INPUTS).unwrap();
        assert_eq!(sim.trace().names().collect::<Vec<_>>(), vec!["y"]);
        assert_eq!(sim.trace().to_string(), "y 0 1\n");

        let options = SimulationOptions { traced: TraceSelection::Named, ..SimulationOptions::default() };
        let sim = Simulation::new(&nl, options).unwrap();
        assert_eq!(sim.trace().names().collect::<Vec<_>>(), vec!["count", "y"]);

        let options =
            SimulationOptions { traced: TraceSelection::Signals(vec!["z".to_owned()]), ..SimulationOptions::default() };
        assert!(matches!(Simulation::new(&nl, options), Err(SimulationError::UnknownSignal(_))));
    }

    #[test]
    fn test_named_trace_keeps_user_names() {
        let mut nl = Netlist::new();
        let sensor = nl.add_input("tmp_sensor", 2).unwrap();
        let offset = nl.add_input("constant_in", 2).unwrap();
        let sum = nl.add_xor(sensor, offset).unwrap();
        let y = nl.add_output("y", 2).unwrap();
        nl.connect(y, sum).unwrap();
        let mut sim = Simulation::new(&nl, SimulationOptions::default()).unwrap();
        sim.step([("tmp_sensor", 1), ("constant_in", 3)]).unwrap();
        assert_eq!(sim.trace().names().collect::<Vec<_>>(), vec!["constant_in", "tmp_sensor", "y"]);
        assert_eq!(sim.trace().values("y").unwrap(), &[2]);
    }
}
