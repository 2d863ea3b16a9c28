use std::collections::{BTreeMap, BTreeSet};

use indexmap::{map::Entry, IndexMap};

use gatesmith_netlist::{Error, Netlist, Opcode, OpParam, Role, SignalId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum ArgKey {
    Signal(SignalId),
    Const { width: u32, value: u128 },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct OpKey {
    op: Opcode,
    param: OpParam,
    width: u32,
    args: Vec<ArgKey>,
}

struct Numberer(IndexMap<OpKey, SignalId>);

impl Numberer {
    fn new() -> Self {
        Numberer(IndexMap::new())
    }

    /// Returns the signal already computing `key`, or records `dest` as computing it.
    fn find_or_insert(&mut self, key: OpKey, dest: SignalId) -> Option<SignalId> {
        match self.0.entry(key) {
            Entry::Occupied(entry) => Some(*entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(dest);
                None
            }
        }
    }
}

/// Merges operations computing the same function of the same arguments.
///
/// Only operations driving plain wires take part: register and output destinations are never
/// renamed, and memory writes have no result to share.
pub fn merge(netlist: &mut Netlist) -> Result<bool, Error> {
    let mut numberer = Numberer::new();
    let mut replacements: BTreeMap<SignalId, SignalId> = BTreeMap::new();
    let mut merged = BTreeSet::new();
    for index in netlist.dependency_order()? {
        let operation = &netlist.operations()[index];
        let Some(dest) = operation.dest() else { continue };
        if operation.op == Opcode::Reg || netlist.signal(dest).role != Role::Plain {
            continue;
        }
        let mut args: Vec<ArgKey> = operation
            .args
            .iter()
            .map(|&arg| {
                let arg = replacements.get(&arg).copied().unwrap_or(arg);
                match netlist.signal(arg).as_const() {
                    Some(value) => ArgKey::Const { width: netlist.width(arg), value },
                    None => ArgKey::Signal(arg),
                }
            })
            .collect();
        if operation.op.is_commutative() {
            args.sort();
        }
        let key = OpKey { op: operation.op, param: operation.param.clone(), width: netlist.width(dest), args };
        if let Some(canon) = numberer.find_or_insert(key, dest) {
            log::trace!("merge: {} => {}", netlist.display_signal(dest), netlist.display_signal(canon));
            replacements.insert(dest, canon);
            merged.insert(index);
        }
    }
    if merged.is_empty() {
        return Ok(false);
    }
    netlist.replace_signals(&replacements)?;
    netlist.retain_operations(|index, _| !merged.contains(&index));
    netlist.remove_unused_signals("merge")?;
    log::debug!("merge: merged {} operations", merged.len());
    Ok(true)
}
