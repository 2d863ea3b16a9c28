use std::collections::BTreeSet;

use gatesmith_netlist::{Error, Netlist, Opcode, Operation};

fn is_root(netlist: &Netlist, operation: &Operation) -> bool {
    operation.op == Opcode::MemWrite || operation.dests.iter().any(|&dest| netlist.signal(dest).is_output())
}

/// Removes every operation that does not contribute to an output or a memory write, and every
/// signal left unreferenced. Inputs are always kept.
pub fn dead_code(netlist: &mut Netlist) -> Result<bool, Error> {
    let drivers = netlist.drivers();
    let mut live = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut queue = vec![];
    // Find roots.
    for (index, operation) in netlist.operations().iter().enumerate() {
        if is_root(netlist, operation) {
            live.insert(index);
            queue.extend(operation.args.iter().copied());
        }
    }
    // Mark everything the roots depend on.
    while let Some(signal) = queue.pop() {
        if !visited.insert(signal) {
            continue;
        }
        for &index in drivers.get(&signal).into_iter().flatten() {
            if live.insert(index) {
                queue.extend(netlist.operations()[index].args.iter().copied());
            }
        }
    }
    let dead = netlist.operation_count() - live.len();
    if dead > 0 {
        for (index, operation) in netlist.operations().iter().enumerate() {
            if !live.contains(&index) {
                log::trace!("dead code elimination: removing `{}`", netlist.display_operation(operation));
            }
        }
        netlist.retain_operations(|index, _| live.contains(&index));
        log::debug!("dead code elimination: removed {dead} operations");
    }
    for name in netlist.remove_unused_signals("dead code elimination")? {
        log::debug!("dead code elimination: input {name:?} is unused");
    }
    Ok(dead > 0)
}
