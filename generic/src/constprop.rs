use std::collections::{BTreeMap, BTreeSet};

use gatesmith_netlist::{Error, Netlist, Opcode, Operation, SignalId};

enum Folded {
    /// The result is a constant.
    Const(u128),
    /// The result is another signal, possibly wider than the destination.
    Signal(SignalId),
    /// The result is the complement of a 1-bit signal.
    Not(SignalId),
}

fn fold(netlist: &Netlist, operation: &Operation) -> Option<Folded> {
    let consts: Vec<Option<u128>> = operation.args.iter().map(|&arg| netlist.signal(arg).as_const()).collect();
    if consts.iter().all(Option::is_none) {
        return None;
    }
    let dest_width = netlist.width(operation.dest()?);
    let widths: Vec<u32> = operation.args.iter().map(|&arg| netlist.width(arg)).collect();
    match operation.op {
        Opcode::Buffer | Opcode::Concat | Opcode::Select | Opcode::Reg | Opcode::MemRead | Opcode::MemWrite => None,
        _ if consts.iter().all(Option::is_some) => {
            let values: Vec<u128> = consts.into_iter().flatten().collect();
            operation.evaluate(&values, &widths, dest_width).map(Folded::Const)
        }
        Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Nand if widths == [1, 1] => {
            let (var, constant) = match consts[..] {
                [Some(constant), None] => (operation.args[1], constant),
                [None, Some(constant)] => (operation.args[0], constant),
                _ => return None,
            };
            let if_zero = operation.evaluate(&[constant, 0], &widths, 1)?;
            let if_one = operation.evaluate(&[constant, 1], &widths, 1)?;
            match (if_zero, if_one) {
                (if_zero, if_one) if if_zero == if_one => Some(Folded::Const(if_zero)),
                (0, 1) => Some(Folded::Signal(var)),
                _ => Some(Folded::Not(var)),
            }
        }
        Opcode::Mux => {
            let select = consts[0]?;
            Some(Folded::Signal(operation.args[if select & 1 != 0 { 2 } else { 1 }]))
        }
        _ => None,
    }
}

struct ConstCache(BTreeMap<(u32, u128), SignalId>);

impl ConstCache {
    fn new(netlist: &Netlist) -> ConstCache {
        let mut cache = BTreeMap::new();
        for id in netlist.consts() {
            let signal = netlist.signal(id);
            cache.entry((signal.width, signal.as_const().unwrap_or_default())).or_insert(id);
        }
        ConstCache(cache)
    }

    fn get(&mut self, netlist: &mut Netlist, width: u32, value: u128) -> Result<SignalId, Error> {
        if let Some(&id) = self.0.get(&(width, value)) {
            return Ok(id);
        }
        let id = netlist.add_const(value, width)?;
        self.0.insert((width, value), id);
        Ok(id)
    }
}

fn propagate(netlist: &mut Netlist) -> Result<bool, Error> {
    let decisions: Vec<(usize, Folded)> = netlist
        .operations()
        .iter()
        .enumerate()
        .filter_map(|(index, operation)| fold(netlist, operation).map(|folded| (index, folded)))
        .collect();
    if decisions.is_empty() {
        return Ok(false);
    }

    let mut cache = ConstCache::new(netlist);
    let mut replacements = BTreeMap::new();
    let mut rewrites = vec![];
    let mut removed = BTreeSet::new();
    for (index, folded) in decisions {
        let dest = netlist.operations()[index].dests[0];
        let width = netlist.width(dest);
        let replacement = match folded {
            Folded::Const(value) => cache.get(netlist, width, value)?,
            Folded::Signal(signal) => signal,
            Folded::Not(signal) => {
                rewrites.push((index, Operation::new(Opcode::Not, [signal], dest)));
                continue;
            }
        };
        if netlist.signal(dest).is_output() || netlist.width(replacement) != width {
            rewrites.push((index, Operation::new(Opcode::Buffer, [replacement], dest)));
        } else {
            replacements.insert(dest, replacement);
            removed.insert(index);
        }
    }
    for (index, operation) in rewrites {
        log::trace!(
            "constant propagation: `{}` becomes `{}`",
            netlist.display_operation(&netlist.operations()[index]),
            netlist.display_operation(&operation)
        );
        netlist.replace_operation(index, operation)?;
    }
    for (&dest, &replacement) in &replacements {
        log::trace!("constant propagation: {} becomes {}", netlist.display_signal(dest), netlist.display_signal(replacement));
    }
    netlist.replace_signals(&replacements)?;
    netlist.retain_operations(|index, _| !removed.contains(&index));
    netlist.remove_unused_signals("constant propagation")?;
    Ok(true)
}

/// Folds operations with constant arguments, repeating until nothing changes.
///
/// Operations whose arguments are all constant are replaced by their value. A 1-bit boolean
/// operation with one constant argument becomes a constant, a copy, or a complement of the other
/// argument. A multiplexer with a constant select becomes a copy of the selected input.
pub fn constant_propagation(netlist: &mut Netlist) -> Result<bool, Error> {
    // Every round removes or simplifies at least one operation for good.
    let limit = netlist.operation_count() + 1;
    for round in 0.. {
        if round > limit {
            return Err(Error::internal(format!("constant propagation did not converge after {limit} rounds")));
        }
        if !propagate(netlist)? {
            log::debug!("constant propagation: converged after {round} rounds");
            return Ok(round > 0);
        }
    }
    unreachable!()
}

#[cfg(test)]
mod test {
    use gatesmith_netlist::{Netlist, Opcode, Operation};

    use super::constant_propagation;

    #[test]
    fn test_fold_all_constant() {
        let mut nl = Netlist::new();
        let c3 = nl.add_const(3, 4).unwrap();
        let c5 = nl.add_const(5, 4).unwrap();
        let a = nl.add_input("a", 5).unwrap();
        let y = nl.add_output("y", 5).unwrap();
        let sum = nl.add_add(c3, c5).unwrap();
        let t = nl.add_xor(a, sum).unwrap();
        nl.connect(y, t).unwrap();
        assert!(constant_propagation(&mut nl).unwrap());
        assert_eq!(nl.operation_count(), 2);
        let xor = &nl.operations()[0];
        assert_eq!(xor.op, Opcode::Xor);
        assert_eq!(nl.signal(xor.args[1]).as_const(), Some(8));
        assert_eq!(nl.validate(), Ok(()));
    }

    #[test]
    fn test_one_bit_rules() {
        for (op, constant, expect) in [
            (Opcode::And, 0, Some(Some(0))),
            (Opcode::And, 1, None),
            (Opcode::Or, 1, Some(Some(1))),
            (Opcode::Or, 0, None),
            (Opcode::Xor, 1, Some(None)),
            (Opcode::Nand, 1, Some(None)),
            (Opcode::Nand, 0, Some(Some(1))),
        ] {
            let mut nl = Netlist::new();
            let a = nl.add_input("a", 1).unwrap();
            let c = nl.add_const(constant, 1).unwrap();
            let t = nl.add_named_wire("t", 1).unwrap();
            nl.add_operation(Operation::new(op, [c, a], t)).unwrap();
            let b = nl.add_input("b", 1).unwrap();
            let y = nl.add_output("y", 2).unwrap();
            let cat = nl.add_concat([t, b]).unwrap();
            nl.connect(y, cat).unwrap();
            assert!(constant_propagation(&mut nl).unwrap());
            let concat = nl.operations().iter().find(|operation| operation.op == Opcode::Concat).unwrap();
            let result = concat.args[0];
            match expect {
                // Folded to a constant.
                Some(Some(value)) => assert_eq!(nl.signal(result).as_const(), Some(value)),
                // Folded to the complement of `a`.
                Some(None) => {
                    let producer = nl.producers()[&result];
                    assert_eq!(nl.operations()[producer], Operation::new(Opcode::Not, [a], result));
                }
                // Folded to `a` itself.
                None => assert_eq!(result, a),
            }
            assert_eq!(nl.validate(), Ok(()), "{op}");
        }
    }

    #[test]
    fn test_output_destination() {
        let mut nl = Netlist::new();
        let c = nl.add_const(2, 2).unwrap();
        let d = nl.add_const(1, 2).unwrap();
        let y = nl.add_output("y", 2).unwrap();
        nl.add_operation(Operation::new(Opcode::Or, [c, d], y)).unwrap();
        assert!(constant_propagation(&mut nl).unwrap());
        let buffer = &nl.operations()[0];
        assert_eq!(buffer.op, Opcode::Buffer);
        assert_eq!(nl.signal(buffer.args[0]).as_const(), Some(3));
        assert!(!constant_propagation(&mut nl).unwrap());
    }

    #[test]
    fn test_constant_select() {
        let mut nl = Netlist::new();
        let s = nl.add_const(1, 1).unwrap();
        let a = nl.add_input("a", 4).unwrap();
        let b = nl.add_input("b", 4).unwrap();
        let y = nl.add_output("y", 4).unwrap();
        let m = nl.add_mux(s, a, b).unwrap();
        let n = nl.add_not(m).unwrap();
        nl.connect(y, n).unwrap();
        assert!(constant_propagation(&mut nl).unwrap());
        assert_eq!(nl.operations()[0], Operation::new(Opcode::Not, [b], n));
    }

    #[test]
    fn test_chained_folding() {
        let mut nl = Netlist::new();
        let one = nl.add_const(1, 1).unwrap();
        let zero = nl.add_const(0, 1).unwrap();
        let y = nl.add_output("y", 1).unwrap();
        let t1 = nl.add_xor(one, zero).unwrap();
        let t2 = nl.add_and(t1, one).unwrap();
        let t3 = nl.add_not(t2).unwrap();
        nl.connect(y, t3).unwrap();
        assert!(constant_propagation(&mut nl).unwrap());
        assert_eq!(nl.operation_count(), 1);
        assert_eq!(nl.signal(nl.operations()[0].args[0]).as_const(), Some(0));
    }
}
