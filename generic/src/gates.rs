use gatesmith_netlist::{Error, Netlist, Opcode, OpcodeSet, Operation, Problem};

use crate::synthesize::SYNTHESIZED_OPS;

const STRUCTURAL_OPS: [Opcode; 6] =
    [Opcode::Buffer, Opcode::Reg, Opcode::Concat, Opcode::Select, Opcode::MemRead, Opcode::MemWrite];

fn opcode_set(gates: &[Opcode]) -> OpcodeSet {
    STRUCTURAL_OPS.iter().chain(gates).copied().collect()
}

/// Rewrites every operation through `rewrite`, which either returns the operation unchanged or
/// builds a replacement that drives the same destination.
fn rewrite_gates(
    netlist: &mut Netlist,
    pass: &str,
    gates: &[Opcode],
    rewrite: impl Fn(&mut Netlist, &Operation) -> Result<Option<Operation>, Error>,
) -> Result<(), Error> {
    let accepted = OpcodeSet::from_iter(SYNTHESIZED_OPS.into_iter().chain([Opcode::Nand]));
    let mut problems = vec![];
    for operation in netlist.operations() {
        if !accepted.contains(operation.op) {
            problems.push(Problem::IllegalOpcode {
                operation: netlist.display_operation(operation).to_string(),
                op: operation.op,
                legal: accepted,
            });
        }
    }
    if !problems.is_empty() {
        return Err(Error::Invalid(problems));
    }

    let operations = netlist.operations().to_vec();
    let before = operations.len();
    netlist.retain_operations(|_, _| false);
    netlist.set_legal_ops(opcode_set(gates));
    for operation in operations {
        match rewrite(netlist, &operation)? {
            Some(replacement) => {
                log::trace!(
                    "{pass}: `{}` becomes `{}`",
                    netlist.display_operation(&operation),
                    netlist.display_operation(&replacement)
                );
                netlist.add_operation(replacement)?;
            }
            None => netlist.add_operation(operation)?,
        }
    }
    crate::check_pass_result(netlist, pass)?;
    log::info!("{pass}: {before} -> {} operations", netlist.operation_count());
    Ok(())
}

/// Rewrites a synthesized netlist to use `nand` and `not` as its only gates.
pub fn nand_synth(netlist: &mut Netlist) -> Result<(), Error> {
    rewrite_gates(netlist, "nand synthesis", &[Opcode::Nand, Opcode::Not], |netlist, operation| {
        let args = &operation.args;
        let dest = operation.dests.first().copied();
        let replacement = match (operation.op, dest) {
            (Opcode::And, Some(dest)) => {
                let nand = netlist.add_nand(args[0], args[1])?;
                Operation::new(Opcode::Not, [nand], dest)
            }
            (Opcode::Or, Some(dest)) => {
                let a_inv = netlist.add_not(args[0])?;
                let b_inv = netlist.add_not(args[1])?;
                Operation::new(Opcode::Nand, [a_inv, b_inv], dest)
            }
            (Opcode::Xor, Some(dest)) => {
                let both = netlist.add_nand(args[0], args[1])?;
                let a_only = netlist.add_nand(args[0], both)?;
                let b_only = netlist.add_nand(args[1], both)?;
                Operation::new(Opcode::Nand, [a_only, b_only], dest)
            }
            _ => return Ok(None),
        };
        Ok(Some(replacement))
    })
}

/// Rewrites a synthesized netlist to use `and` and `not` as its only gates.
pub fn and_inverter_synth(netlist: &mut Netlist) -> Result<(), Error> {
    rewrite_gates(netlist, "and-inverter synthesis", &[Opcode::And, Opcode::Not], |netlist, operation| {
        let args = &operation.args;
        let dest = operation.dests.first().copied();
        let replacement = match (operation.op, dest) {
            (Opcode::Nand, Some(dest)) => {
                let and = netlist.add_and(args[0], args[1])?;
                Operation::new(Opcode::Not, [and], dest)
            }
            (Opcode::Or, Some(dest)) => {
                let a_inv = netlist.add_not(args[0])?;
                let b_inv = netlist.add_not(args[1])?;
                let neither = netlist.add_and(a_inv, b_inv)?;
                Operation::new(Opcode::Not, [neither], dest)
            }
            (Opcode::Xor, Some(dest)) => {
                let a_inv = netlist.add_not(args[0])?;
                let b_inv = netlist.add_not(args[1])?;
                let both = netlist.add_and(args[0], args[1])?;
                let neither = netlist.add_and(a_inv, b_inv)?;
                let not_both = netlist.add_not(both)?;
                let either = netlist.add_not(neither)?;
                Operation::new(Opcode::And, [not_both, either], dest)
            }
            _ => return Ok(None),
        };
        Ok(Some(replacement))
    })
}

#[cfg(test)]
mod test {
    use gatesmith_netlist::{Netlist, Opcode, Problem};

    use super::{and_inverter_synth, nand_synth};

    fn gates() -> Netlist {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 1).unwrap();
        let b = nl.add_input("b", 1).unwrap();
        let y = nl.add_output("y", 3).unwrap();
        let and = nl.add_and(a, b).unwrap();
        let or = nl.add_or(a, b).unwrap();
        let xor = nl.add_xor(a, b).unwrap();
        let cat = nl.add_concat([and, or, xor]).unwrap();
        nl.connect(y, cat).unwrap();
        nl
    }

    #[test]
    fn test_nand_synth() {
        let mut nl = gates();
        nand_synth(&mut nl).unwrap();
        let statistics = nl.statistics();
        assert!(statistics.keys().all(|op| matches!(op, Opcode::Nand | Opcode::Not | Opcode::Concat | Opcode::Buffer)));
        assert!(!nl.legal_ops().contains(Opcode::And));
        assert_eq!(nl.validate(), Ok(()));
    }

    #[test]
    fn test_and_inverter_synth() {
        let mut nl = gates();
        and_inverter_synth(&mut nl).unwrap();
        let statistics = nl.statistics();
        assert!(statistics.keys().all(|op| matches!(op, Opcode::And | Opcode::Not | Opcode::Concat | Opcode::Buffer)));
        assert!(!nl.legal_ops().contains(Opcode::Xor));
        assert_eq!(nl.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_unsynthesized() {
        let mut nl = Netlist::new();
        let a = nl.add_input("a", 2).unwrap();
        let y = nl.add_output("y", 3).unwrap();
        let sum = nl.add_add(a, a).unwrap();
        nl.connect(y, sum).unwrap();
        let error = nand_synth(&mut nl).unwrap_err();
        assert!(matches!(error.problems(), [Problem::IllegalOpcode { op: Opcode::Add, .. }]));
        assert_eq!(nl.operation_count(), 2);
    }
}
