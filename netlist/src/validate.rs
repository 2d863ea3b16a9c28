use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::check;
use crate::{Error, Netlist, Opcode, OpParam, Operation, Problem, Role, SignalId};

impl Netlist {
    fn malformed(&self, operation: &Operation, reason: impl Into<String>) -> Problem {
        Problem::Malformed { operation: self.display_operation(operation).to_string(), reason: reason.into() }
    }

    fn misused(&self, operation: &Operation, signal: SignalId, reason: &'static str) -> Problem {
        Problem::MisusedSignal {
            operation: self.display_operation(operation).to_string(),
            signal: self.signal(signal).name.clone(),
            reason,
        }
    }

    /// Checks a single operation against the netlist it is (or is about to be) part of.
    pub(crate) fn operation_problems(&self, operation: &Operation) -> Vec<Problem> {
        let mut problems = vec![];
        let op = operation.op;
        if !self.legal_ops().contains(op) {
            problems.push(Problem::IllegalOpcode {
                operation: self.display_operation(operation).to_string(),
                op,
                legal: self.legal_ops(),
            });
        }
        let mut unknown = false;
        operation.visit(|signal| {
            if !self.contains_signal(signal) {
                problems.push(Problem::UnknownSignal {
                    operation: self.display_operation(operation).to_string(),
                    signal,
                });
                unknown = true;
            }
        });
        if unknown {
            return problems;
        }

        match op.arity() {
            Some(arity) if operation.args.len() != arity => {
                problems.push(self.malformed(
                    operation,
                    format!("expected {arity} arguments, found {}", operation.args.len()),
                ));
            }
            None if operation.args.is_empty() => {
                problems.push(self.malformed(operation, "expected at least one argument"));
            }
            _ => (),
        }
        if operation.dests.len() != op.dest_count() {
            problems.push(self.malformed(
                operation,
                format!("expected {} destinations, found {}", op.dest_count(), operation.dests.len()),
            ));
        }
        if !problems.is_empty() {
            return problems;
        }

        let memory = match (op, &operation.param) {
            (Opcode::Select, OpParam::Select(bits)) => {
                if bits.is_empty() {
                    problems.push(self.malformed(operation, "selection is empty"));
                }
                let width = self.width(operation.args[0]);
                if let Some(bit) = bits.iter().find(|&&bit| bit >= width) {
                    problems.push(self.malformed(operation, format!("bit {bit} is out of range for width {width}")));
                }
                None
            }
            (Opcode::MemRead | Opcode::MemWrite, &OpParam::Memory(memory)) => match self.get_memory(memory) {
                Some(memory) => Some(memory),
                None => {
                    problems.push(Problem::UnknownMemory {
                        operation: self.display_operation(operation).to_string(),
                        memory,
                    });
                    return problems;
                }
            },
            (Opcode::Select | Opcode::MemRead | Opcode::MemWrite, _) => {
                problems.push(self.malformed(operation, "missing parameter"));
                return problems;
            }
            (_, OpParam::None) => None,
            (_, _) => {
                problems.push(self.malformed(operation, "unexpected parameter"));
                None
            }
        };

        for &dest in &operation.dests {
            match self.signal(dest).role {
                Role::Input => problems.push(self.misused(operation, dest, "inputs cannot be driven")),
                Role::Const(_) => problems.push(self.misused(operation, dest, "constants cannot be driven")),
                Role::Register if op != Opcode::Reg => {
                    problems.push(self.misused(operation, dest, "registers can only be driven by a register operation"))
                }
                Role::Plain | Role::Output if op == Opcode::Reg => {
                    problems.push(self.misused(operation, dest, "register operations must drive a register"))
                }
                _ => (),
            }
        }
        for &arg in &operation.args {
            if self.signal(arg).is_output() {
                problems.push(self.misused(operation, arg, "outputs cannot be read"));
            }
        }

        let args: Vec<u32> = operation.args.iter().map(|&arg| self.width(arg)).collect();
        let dest_width = operation.dest().map(|dest| self.width(dest));
        let equal_widths = |problems: &mut Vec<Problem>, first: usize, second: usize| {
            if args[first] != args[second] {
                problems.push(self.malformed(
                    operation,
                    format!("argument widths {} and {} differ", args[first], args[second]),
                ));
            }
        };
        let limit = match op {
            Opcode::Buffer | Opcode::Not | Opcode::Reg => Some(args[0]),
            Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Nand => {
                equal_widths(&mut problems, 0, 1);
                Some(args[0])
            }
            Opcode::Add | Opcode::Sub => {
                equal_widths(&mut problems, 0, 1);
                Some(args[0] + 1)
            }
            Opcode::Mul => {
                equal_widths(&mut problems, 0, 1);
                Some(2 * args[0])
            }
            Opcode::Eq | Opcode::Lt | Opcode::Gt => {
                equal_widths(&mut problems, 0, 1);
                if dest_width != Some(1) {
                    problems.push(self.malformed(operation, "comparison result must be 1 bit wide"));
                }
                None
            }
            Opcode::Mux => {
                if args[0] != 1 {
                    problems.push(self.malformed(operation, "mux select must be 1 bit wide"));
                }
                equal_widths(&mut problems, 1, 2);
                Some(args[1])
            }
            Opcode::Concat => Some(args.iter().sum()),
            Opcode::Select => operation.param.as_select().map(|bits| bits.len() as u32),
            Opcode::MemRead | Opcode::MemWrite => {
                let Some(memory) = memory else { unreachable!() };
                if args[0] != memory.addr_width {
                    problems.push(self.malformed(
                        operation,
                        format!("address is {} bits wide, memory expects {}", args[0], memory.addr_width),
                    ));
                }
                if op == Opcode::MemWrite {
                    if args[1] != memory.data_width {
                        problems.push(self.malformed(
                            operation,
                            format!("data is {} bits wide, memory expects {}", args[1], memory.data_width),
                        ));
                    }
                    if args[2] != 1 {
                        problems.push(self.malformed(operation, "write enable must be 1 bit wide"));
                    }
                    if memory.read_only {
                        problems.push(Problem::WriteToReadOnly {
                            operation: self.display_operation(operation).to_string(),
                            memory: memory.name.clone(),
                        });
                    }
                    None
                } else {
                    Some(memory.data_width)
                }
            }
        };
        if let (Some(limit), Some(dest_width)) = (limit, dest_width) {
            if dest_width > limit {
                problems.push(self.malformed(
                    operation,
                    format!("destination is {dest_width} bits wide, but the result has only {limit}"),
                ));
            }
        }
        problems
    }

    /// Read ports of synchronous memories whose address depends on anything other than registers,
    /// inputs and constants, through buffers, concatenations and selections only.
    ///
    /// Malformed operations are already reported elsewhere and are not traced through.
    fn clock_problems(&self, producers: &BTreeMap<SignalId, usize>, well_formed: &[bool]) -> Vec<Problem> {
        let mut problems = vec![];
        let mut reported = BTreeSet::new();
        for (index, operation) in self.operations().iter().enumerate() {
            if operation.op != Opcode::MemRead || !well_formed[index] {
                continue;
            }
            let Some(memory_id) = operation.param.as_memory() else { continue };
            let memory = self.memory(memory_id);
            if memory.asynchronous {
                continue;
            }
            let mut queue = vec![operation.args[0]];
            let mut visited = BTreeSet::new();
            while let Some(signal) = queue.pop() {
                if !self.contains_signal(signal) || !visited.insert(signal) {
                    continue;
                }
                if self.signal(signal).is_register() || self.signal(signal).is_terminal() {
                    continue;
                }
                let Some(&producer) = producers.get(&signal).filter(|&&producer| well_formed[producer]) else {
                    continue;
                };
                let source = &self.operations()[producer];
                if source.op.is_transparent() {
                    queue.extend(source.args.iter().copied());
                } else if reported.insert((memory_id, producer)) {
                    problems.push(Problem::UnsynchronizedRead {
                        memory: memory.name.clone(),
                        source: self.display_operation(source).to_string(),
                    });
                }
            }
        }
        problems
    }

    /// Checks every structural invariant of the netlist, reporting all problems found at once.
    pub fn validate(&self) -> Result<(), Error> {
        let mut problems = vec![];
        let mut names = BTreeSet::new();
        for (_, signal) in self.signals() {
            problems.extend(Self::signal_problems(signal));
            if !names.insert(&signal.name) {
                problems.push(Problem::DuplicateName(signal.name.clone()));
            }
        }
        let mut well_formed = vec![true; self.operation_count()];
        for (index, operation) in self.operations().iter().enumerate() {
            let operation_problems = self.operation_problems(operation);
            well_formed[index] = operation_problems.is_empty();
            problems.extend(operation_problems);
        }

        let mut drivers = self.drivers();
        drivers.retain(|&signal, _| self.contains_signal(signal));
        for (&signal, driven_by) in &drivers {
            if driven_by.len() > 1 {
                problems.push(Problem::MultipleDrivers { signal: self.signal(signal).name.clone(), count: driven_by.len() });
            }
        }
        let mut used = BTreeSet::new();
        for operation in self.operations() {
            used.extend(operation.args.iter().copied());
        }
        for (id, signal) in self.signals() {
            let driven = drivers.contains_key(&id);
            if signal.is_terminal() {
                continue;
            }
            if used.contains(&id) && !driven {
                problems.push(Problem::Undriven { signal: signal.name.clone() });
            } else if !used.contains(&id) && !driven {
                problems.push(Problem::Unconnected { signal: signal.name.clone() });
            }
        }
        problems.extend(self.clock_problems(&self.producers(), &well_formed));
        check(problems)
    }

    /// Orders operations so that every operation comes after the producers of its arguments.
    ///
    /// Inputs, constants and registers are available from the start, so register operations break
    /// cycles. Operations that cannot be ordered form a combinational cycle. The result is a list of
    /// operation indices.
    pub fn dependency_order(&self) -> Result<Vec<usize>, Error> {
        let mut ready = vec![false; self.arena_len()];
        for (id, signal) in self.signals() {
            if signal.is_terminal() || signal.is_register() {
                ready[id.index()] = true;
            }
        }
        let mut consumers: BTreeMap<SignalId, Vec<usize>> = BTreeMap::new();
        let mut pending = vec![0usize; self.operation_count()];
        let mut queue = VecDeque::new();
        for (index, operation) in self.operations().iter().enumerate() {
            for &arg in &operation.args {
                if !ready[arg.index()] {
                    consumers.entry(arg).or_default().push(index);
                    pending[index] += 1;
                }
            }
            if pending[index] == 0 {
                queue.push_back(index);
            }
        }
        let mut order = Vec::with_capacity(self.operation_count());
        while let Some(index) = queue.pop_front() {
            order.push(index);
            let operation = &self.operations()[index];
            if operation.op == Opcode::Reg {
                continue;
            }
            for &dest in &operation.dests {
                if ready[dest.index()] {
                    continue;
                }
                ready[dest.index()] = true;
                for &consumer in consumers.get(&dest).into_iter().flatten() {
                    pending[consumer] -= 1;
                    if pending[consumer] == 0 {
                        queue.push_back(consumer);
                    }
                }
            }
        }
        if order.len() != self.operation_count() {
            let operations = (0..self.operation_count())
                .filter(|&index| pending[index] != 0)
                .map(|index| self.display_operation(&self.operations()[index]).to_string())
                .collect();
            return Err(Problem::CombinationalCycle { operations }.into());
        }
        Ok(order)
    }
}

#[cfg(test)]
mod test {
    use crate::{Error, Memory, Netlist, Opcode, OpParam, Operation, Problem};

    fn problems(result: Result<(), Error>) -> Vec<Problem> {
        match result {
            Err(Error::Invalid(problems)) => problems,
            other => panic!("expected problems, got {other:?}"),
        }
    }

    #[test]
    fn test_width_rules() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 4).unwrap();
        let b = nl.add_input("b", 4).unwrap();
        let s = nl.add_input("s", 1).unwrap();
        let w6 = nl.add_named_wire("w6", 6).unwrap();
        let w9 = nl.add_named_wire("w9", 9).unwrap();
        let w2 = nl.add_named_wire("w2", 2).unwrap();
        assert!(nl.add_operation(Operation::new(Opcode::Add, [a, b], w6)).is_err());
        assert!(nl.add_operation(Operation::new(Opcode::Mul, [a, b], w9)).is_err());
        assert!(nl.add_operation(Operation::new(Opcode::Eq, [a, b], w2)).is_err());
        assert!(nl.add_operation(Operation::new(Opcode::Mux, [s, a, w2], w2)).is_err());
        assert!(nl.add_operation(Operation::new(Opcode::Concat, [s], w2)).is_err());
        assert!(nl.add_operation(Operation::new(Opcode::Concat, [s, s], w2)).is_ok());
        assert!(nl.add_operation(Operation::new(Opcode::Xor, [a, s], w2)).is_err());
        assert!(nl.add_operation(Operation::new(Opcode::Xor, [a, b], w2)).is_ok());
    }

    #[test]
    fn test_arity_and_params() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 4).unwrap();
        let y = nl.add_output("y", 4).unwrap();
        let error = nl.add_operation(Operation::new(Opcode::And, [a], y)).unwrap_err();
        assert!(matches!(&error.problems()[0], Problem::Malformed { reason, .. } if reason.contains("expected 2")));
        let bad_param = Operation { param: OpParam::Select(vec![0]), ..Operation::new(Opcode::Not, [a], y) };
        assert!(nl.add_operation(bad_param).is_err());
        let empty = Operation::select(a, Vec::new(), y);
        assert!(nl.add_operation(empty).is_err());
    }

    #[test]
    fn test_terminal_misuse() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 1).unwrap();
        let y = nl.add_output("y", 1).unwrap();
        let r = nl.add_register("r", 1).unwrap();
        let t = nl.add_named_wire("t", 1).unwrap();
        for operation in [
            Operation::new(Opcode::Not, [t], a),
            Operation::new(Opcode::Not, [y], t),
            Operation::new(Opcode::Not, [a], r),
            Operation::new(Opcode::Reg, [a], t),
        ] {
            let error = nl.add_operation(operation).unwrap_err();
            assert!(matches!(error.problems()[0], Problem::MisusedSignal { .. }), "{error}");
        }
        nl.set_next(r, a).unwrap();
    }

    #[test]
    fn test_illegal_opcode() {
        let mut nl = Netlist::new();
        nl.set_legal_ops([Opcode::Not, Opcode::And]);
        let a = nl.add_input("a", 1).unwrap();
        let b = nl.add_input("b", 1).unwrap();
        assert!(nl.add_and(a, b).is_ok());
        let error = nl.add_or(a, b).unwrap_err();
        assert!(matches!(error.problems()[0], Problem::IllegalOpcode { op: Opcode::Or, .. }));
    }

    #[test]
    fn test_validate_reports_structure_with_operation_problems() {
        let mut nl = Netlist::new();
        let mem = nl.add_memory(Memory::new("mem", 2, 2)).unwrap();
        let a = nl.add_input("a", 2).unwrap();
        let u = nl.add_named_wire("u", 2).unwrap();
        let y = nl.add_output("y", 2).unwrap();
        let z = nl.add_output("z", 2).unwrap();
        let t = nl.add_and(a, u).unwrap();
        nl.connect(y, t).unwrap();
        let inverted = nl.add_not(a).unwrap();
        let q = nl.add_mem_read(mem, inverted).unwrap();
        nl.connect(z, q).unwrap();
        // Narrowing the legal set makes the existing `and` illegal.
        nl.set_legal_ops([Opcode::Not, Opcode::Buffer, Opcode::MemRead]);
        let problems = problems(nl.validate());
        assert!(problems.iter().any(|problem| matches!(problem, Problem::IllegalOpcode { op: Opcode::And, .. })));
        assert!(problems.contains(&Problem::Undriven { signal: "u".into() }));
        assert!(problems.iter().any(|problem| matches!(problem, Problem::UnsynchronizedRead { memory, .. } if memory == "mem")));
    }

    #[test]
    fn test_validate_drivers() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 1).unwrap();
        let t = nl.add_named_wire("t", 1).unwrap();
        let u = nl.add_named_wire("u", 1).unwrap();
        nl.add_named_wire("floating", 1).unwrap();
        let y = nl.add_output("y", 1).unwrap();
        nl.add_operation(Operation::new(Opcode::Not, [a], t)).unwrap();
        nl.add_operation(Operation::new(Opcode::Buffer, [a], t)).unwrap();
        nl.add_operation(Operation::new(Opcode::And, [t, u], y)).unwrap();
        let problems = problems(nl.validate());
        assert_eq!(
            problems,
            vec![
                Problem::MultipleDrivers { signal: "t".into(), count: 2 },
                Problem::Undriven { signal: "u".into() },
                Problem::Unconnected { signal: "floating".into() },
            ]
        );
    }

    #[test]
    fn test_validate_ok() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 1).unwrap();
        let b = nl.add_input("b", 1).unwrap();
        let y = nl.add_output("y", 1).unwrap();
        let t = nl.add_xor(a, b).unwrap();
        nl.connect(y, t).unwrap();
        assert_eq!(nl.validate(), Ok(()));
    }

    #[test]
    fn test_unsynchronized_read() {
        let mut nl = Netlist::new();
        let mem = nl.add_memory(Memory::new("mem", 4, 2)).unwrap();
        let a = nl.add_input("a", 2).unwrap();
        let r = nl.add_register("r", 2).unwrap();
        nl.set_next(r, a).unwrap();
        let y = nl.add_output("y", 4).unwrap();
        // Through a selection of a register is fine.
        let rr = nl.add_concat([r]).unwrap();
        let swapped = nl.add_select(rr, [1, 0]).unwrap();
        let q = nl.add_mem_read(mem, swapped).unwrap();
        nl.connect(y, q).unwrap();
        assert_eq!(nl.validate(), Ok(()));
        // Through logic is not.
        let z = nl.add_output("z", 4).unwrap();
        let inverted = nl.add_not(a).unwrap();
        let q2 = nl.add_mem_read(mem, inverted).unwrap();
        nl.connect(z, q2).unwrap();
        let problems = problems(nl.validate());
        assert!(matches!(&problems[..], [Problem::UnsynchronizedRead { memory, .. }] if memory == "mem"));
    }

    #[test]
    fn test_asynchronous_memory() {
        let mut nl = Netlist::new();
        let mem = nl.add_memory(Memory { asynchronous: true, ..Memory::new("mem", 4, 2) }).unwrap();
        let a = nl.add_input("a", 2).unwrap();
        let y = nl.add_output("y", 4).unwrap();
        let inverted = nl.add_not(a).unwrap();
        let q = nl.add_mem_read(mem, inverted).unwrap();
        nl.connect(y, q).unwrap();
        assert_eq!(nl.validate(), Ok(()));
    }

    #[test]
    fn test_dependency_order() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 2).unwrap();
        let r = nl.add_register("r", 2).unwrap();
        let y = nl.add_output("y", 2).unwrap();
        let t1 = nl.add_named_wire("t1", 2).unwrap();
        let t2 = nl.add_named_wire("t2", 2).unwrap();
        // Added out of order on purpose.
        nl.add_operation(Operation::new(Opcode::Buffer, [t2], y)).unwrap();
        nl.add_operation(Operation::new(Opcode::Xor, [t1, r], t2)).unwrap();
        nl.add_operation(Operation::new(Opcode::Reg, [t2], r)).unwrap();
        nl.add_operation(Operation::new(Opcode::Not, [a], t1)).unwrap();
        let order = nl.dependency_order().unwrap();
        let position = |index| order.iter().position(|&i| i == index).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(3) < position(1));
        assert!(position(1) < position(0));
        assert!(position(1) < position(2));
    }

    #[test]
    fn test_combinational_cycle() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 1).unwrap();
        let t1 = nl.add_named_wire("t1", 1).unwrap();
        let t2 = nl.add_named_wire("t2", 1).unwrap();
        let y = nl.add_output("y", 1).unwrap();
        nl.add_operation(Operation::new(Opcode::And, [a, t2], t1)).unwrap();
        nl.add_operation(Operation::new(Opcode::Not, [t1], t2)).unwrap();
        nl.add_operation(Operation::new(Opcode::Buffer, [t2], y)).unwrap();
        assert_eq!(nl.validate(), Ok(()));
        let error = nl.dependency_order().unwrap_err();
        assert!(matches!(&error.problems()[0], Problem::CombinationalCycle { operations } if operations.len() == 3));
    }
}
