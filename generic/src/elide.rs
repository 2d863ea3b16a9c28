use std::collections::{BTreeMap, BTreeSet};

use gatesmith_netlist::{Error, Netlist, Opcode, Operation, Role};

/// Whether the operation copies its only argument to a destination of the same width unchanged.
fn is_pass_through(netlist: &Netlist, operation: &Operation) -> bool {
    let &[arg] = operation.args.as_slice() else { return false };
    let Some(dest) = operation.dest() else { return false };
    netlist.width(arg) == netlist.width(dest) && matches!(operation.op, Opcode::Buffer | Opcode::Concat)
}

/// Whether the operation selects every bit of its argument, in order.
fn is_trivial_slice(netlist: &Netlist, operation: &Operation) -> bool {
    let (Opcode::Select, Some(bits)) = (operation.op, operation.param.as_select()) else { return false };
    let width = netlist.width(operation.args[0]);
    operation.dest().is_some_and(|dest| netlist.width(dest) == width) && bits.iter().copied().eq(0..width)
}

fn elide(netlist: &mut Netlist, pass: &str, matches: impl Fn(&Netlist, &Operation) -> bool) -> Result<bool, Error> {
    let mut replacements = BTreeMap::new();
    let mut elided = BTreeSet::new();
    for (index, operation) in netlist.operations().iter().enumerate() {
        if !matches(netlist, operation) {
            continue;
        }
        let dest = operation.dests[0];
        if netlist.signal(dest).is_output() {
            continue;
        }
        log::trace!("{pass}: eliding `{}`", netlist.display_operation(operation));
        replacements.insert(dest, operation.args[0]);
        elided.insert(index);
    }
    if elided.is_empty() {
        return Ok(false);
    }
    netlist.replace_signals(&replacements)?;
    netlist.retain_operations(|index, _| !elided.contains(&index));
    netlist.remove_unused_signals(pass)?;
    log::debug!("{pass}: elided {} operations", elided.len());
    Ok(true)
}

/// Outputs are never substituted, so a copy from a wire into an output is removed by having the
/// producer of the wire drive the output directly, provided nothing else reads the wire.
fn retarget_outputs(
    netlist: &mut Netlist,
    pass: &str,
    matches: impl Fn(&Netlist, &Operation) -> bool,
) -> Result<bool, Error> {
    let producers = netlist.producers();
    let consumers = netlist.consumers();
    let mut retargets = vec![];
    for (index, operation) in netlist.operations().iter().enumerate() {
        if !matches(netlist, operation) {
            continue;
        }
        let (arg, dest) = (operation.args[0], operation.dests[0]);
        if !netlist.signal(dest).is_output()
            || netlist.signal(arg).role != Role::Plain
            || consumers.get(&arg).is_none_or(|readers| readers.len() != 1)
        {
            continue;
        }
        let Some(&producer) = producers.get(&arg) else { continue };
        log::trace!(
            "{pass}: `{}` now drives {}",
            netlist.display_operation(&netlist.operations()[producer]),
            netlist.display_signal(dest)
        );
        retargets.push((index, producer, dest));
    }
    if retargets.is_empty() {
        return Ok(false);
    }
    let mut elided = BTreeSet::new();
    for (index, producer, dest) in retargets {
        let operation = Operation { dests: vec![dest], ..netlist.operations()[producer].clone() };
        netlist.replace_operation(producer, operation)?;
        elided.insert(index);
    }
    netlist.retain_operations(|index, _| !elided.contains(&index));
    netlist.remove_unused_signals(pass)?;
    Ok(true)
}

/// Removes buffers (and single-argument concatenations) that copy a signal unchanged, redirecting
/// their readers to the original signal.
pub fn buffer_elision(netlist: &mut Netlist) -> Result<bool, Error> {
    let did_elide = elide(netlist, "buffer elision", is_pass_through)?;
    let did_retarget = retarget_outputs(netlist, "buffer elision", is_pass_through)?;
    Ok(did_elide || did_retarget)
}

/// Removes selections of every bit of a signal in order.
pub fn slice_elision(netlist: &mut Netlist) -> Result<bool, Error> {
    let did_elide = elide(netlist, "slice elision", is_trivial_slice)?;
    let did_retarget = retarget_outputs(netlist, "slice elision", is_trivial_slice)?;
    Ok(did_elide || did_retarget)
}
