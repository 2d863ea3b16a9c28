use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use crate::{Netlist, Opcode, OpParam, Role, SignalId};

#[derive(Debug)]
pub enum NotIsomorphic {
    NoOutputLeft(String),
    NoOutputRight(String),
    OutputWidthMismatch(String),
    NoMemoryLeft(String),
    NoMemoryRight(String),
    MemoryMismatch(String),
    SignalMismatch(String, String),
}

impl Display for NotIsomorphic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotIsomorphic::NoOutputLeft(name) => write!(f, "output {name:?} is missing in the left netlist"),
            NotIsomorphic::NoOutputRight(name) => write!(f, "output {name:?} is missing in the right netlist"),
            NotIsomorphic::OutputWidthMismatch(name) => write!(f, "width of output {name:?} does not match"),
            NotIsomorphic::NoMemoryLeft(name) => write!(f, "memory {name:?} is missing in the left netlist"),
            NotIsomorphic::NoMemoryRight(name) => write!(f, "memory {name:?} is missing in the right netlist"),
            NotIsomorphic::MemoryMismatch(name) => write!(f, "memory {name:?} differs in shape, contents or ports"),
            NotIsomorphic::SignalMismatch(lft, rgt) => write!(f, "signals {lft} and {rgt} are not isomorphic"),
        }
    }
}

/// Checks that two netlists compute the same thing with the same structure, up to the names of
/// intermediate signals. Outputs, inputs and memories are matched by name; registers and wires
/// are matched by position in the structure.
pub fn isomorphic(lft: &Netlist, rgt: &Netlist) -> Result<(), NotIsomorphic> {
    let mismatch = |sig_l: SignalId, sig_r: SignalId| {
        NotIsomorphic::SignalMismatch(lft.display_signal(sig_l).to_string(), rgt.display_signal(sig_r).to_string())
    };
    let mut queue: BTreeSet<(SignalId, SignalId)> = BTreeSet::new();
    for sig_l in lft.outputs() {
        let name = &lft.signal(sig_l).name;
        let Some(sig_r) = rgt.find_signal(name).filter(|&sig_r| rgt.signal(sig_r).is_output()) else {
            return Err(NotIsomorphic::NoOutputRight(name.clone()));
        };
        if lft.width(sig_l) != rgt.width(sig_r) {
            return Err(NotIsomorphic::OutputWidthMismatch(name.clone()));
        }
        queue.insert((sig_l, sig_r));
    }
    for sig_r in rgt.outputs() {
        let name = &rgt.signal(sig_r).name;
        if !lft.find_signal(name).is_some_and(|sig_l| lft.signal(sig_l).is_output()) {
            return Err(NotIsomorphic::NoOutputLeft(name.clone()));
        }
    }

    let mut memories = BTreeMap::new();
    for (mem_l, memory_l) in lft.memories() {
        let Some(mem_r) = rgt.find_memory(&memory_l.name) else {
            return Err(NotIsomorphic::NoMemoryRight(memory_l.name.clone()));
        };
        if memory_l != rgt.memory(mem_r) {
            return Err(NotIsomorphic::MemoryMismatch(memory_l.name.clone()));
        }
        let (ports_l, ports_r) = (lft.memory_ports(mem_l), rgt.memory_ports(mem_r));
        if ports_l.write_ports.len() != ports_r.write_ports.len() {
            return Err(NotIsomorphic::MemoryMismatch(memory_l.name.clone()));
        }
        for (&port_l, &port_r) in ports_l.write_ports.iter().zip(ports_r.write_ports.iter()) {
            let (args_l, args_r) = (&lft.operations()[port_l].args, &rgt.operations()[port_r].args);
            queue.extend(args_l.iter().copied().zip(args_r.iter().copied()));
        }
        memories.insert(mem_l, mem_r);
    }
    for (_, memory_r) in rgt.memories() {
        if lft.find_memory(&memory_r.name).is_none() {
            return Err(NotIsomorphic::NoMemoryLeft(memory_r.name.clone()));
        }
    }

    let producers_l = lft.producers();
    let producers_r = rgt.producers();
    let mut forward: BTreeMap<SignalId, SignalId> = BTreeMap::new();
    let mut backward: BTreeMap<SignalId, SignalId> = BTreeMap::new();
    while let Some((sig_l, sig_r)) = queue.pop_first() {
        match (forward.get(&sig_l), backward.get(&sig_r)) {
            (Some(&paired_r), _) if paired_r != sig_r => return Err(mismatch(sig_l, sig_r)),
            (_, Some(&paired_l)) if paired_l != sig_l => return Err(mismatch(sig_l, sig_r)),
            (Some(_), _) => continue,
            _ => (),
        }
        forward.insert(sig_l, sig_r);
        backward.insert(sig_r, sig_l);

        let (signal_l, signal_r) = (lft.signal(sig_l), rgt.signal(sig_r));
        if signal_l.width != signal_r.width {
            return Err(mismatch(sig_l, sig_r));
        }
        match (signal_l.role, signal_r.role) {
            (Role::Const(value_l), Role::Const(value_r)) if value_l == value_r => continue,
            (Role::Input, Role::Input) if signal_l.name == signal_r.name => continue,
            (Role::Register, Role::Register) | (Role::Plain | Role::Output, Role::Plain | Role::Output) => (),
            _ => return Err(mismatch(sig_l, sig_r)),
        }
        let (op_l, op_r) = match (producers_l.get(&sig_l), producers_r.get(&sig_r)) {
            (Some(&index_l), Some(&index_r)) => (&lft.operations()[index_l], &rgt.operations()[index_r]),
            (None, None) if signal_l.is_register() => continue,
            _ => return Err(mismatch(sig_l, sig_r)),
        };
        let params_match = match (&op_l.param, &op_r.param) {
            (OpParam::Memory(mem_l), OpParam::Memory(mem_r)) => memories.get(mem_l) == Some(mem_r),
            (param_l, param_r) => param_l == param_r,
        };
        if op_l.op != op_r.op || !params_match || op_l.args.len() != op_r.args.len() {
            return Err(mismatch(sig_l, sig_r));
        }
        debug_assert!(op_l.op != Opcode::MemWrite);
        queue.extend(op_l.args.iter().copied().zip(op_r.args.iter().copied()));
    }
    Ok(())
}

#[macro_export]
macro_rules! assert_isomorphic {
    ( $lft:ident, $rgt:ident ) => {
        let result = gatesmith_netlist::isomorphic(&$lft, &$rgt);
        if let Err(error) = result {
            panic!("{}\nleft netlist:\n{}\nright netlist:\n{}", error, $lft, $rgt);
        }
    };
}
