use gatesmith_generic::{merge, optimize, OptimizeOptions};
use gatesmith_netlist::{assert_isomorphic, Netlist, Opcode, Operation};
use gatesmith_sim::{Simulation, SimulationOptions};

fn optimized(mut netlist: Netlist) -> Netlist {
    optimize(&mut netlist, &OptimizeOptions::default()).unwrap();
    netlist
}

#[test]
fn test_buffer_chain_removed() {
    let mut nl = Netlist::new();
    let a = nl.add_input("a", 8).unwrap();
    let b = nl.add_input("b", 8).unwrap();
    let y = nl.add_output("y", 8).unwrap();
    let x = nl.add_and(a, b).unwrap();
    let t1 = nl.add_buf(x).unwrap();
    let t2 = nl.add_buf(t1).unwrap();
    nl.connect(y, t2).unwrap();
    let nl = optimized(nl);
    assert_eq!(nl.statistics().get(&Opcode::Buffer), None);
    assert_eq!(nl.operations(), &[Operation::new(Opcode::And, [a, b], y)]);
}

#[test]
fn test_output_from_input_keeps_one_buffer() {
    let mut nl = Netlist::new();
    let a = nl.add_input("a", 8).unwrap();
    let y = nl.add_output("y", 8).unwrap();
    let t1 = nl.add_buf(a).unwrap();
    let t2 = nl.add_buf(t1).unwrap();
    nl.connect(y, t2).unwrap();
    let nl = optimized(nl);
    assert_eq!(nl.operations(), &[Operation::new(Opcode::Buffer, [a], y)]);
}

fn mixed() -> Netlist {
    let mut nl = Netlist::new();
    let a = nl.add_input("a", 4).unwrap();
    let b = nl.add_input("b", 4).unwrap();
    let en = nl.add_input("en", 1).unwrap();
    let one = nl.add_const(1, 1).unwrap();
    let r = nl.add_register("r", 4).unwrap();
    let s1 = nl.add_add(a, b).unwrap();
    let s2 = nl.add_add(b, a).unwrap();
    let low1 = nl.add_select(s1, [0, 1, 2, 3]).unwrap();
    let low2 = nl.add_select(s2, [0, 1, 2, 3]).unwrap();
    let gate = nl.add_and(en, one).unwrap();
    let next = nl.add_mux(gate, r, low1).unwrap();
    nl.set_next(r, next).unwrap();
    let x = nl.add_xor(low2, r).unwrap();
    let t = nl.add_buf(x).unwrap();
    let whole = nl.add_select(t, [0, 1, 2, 3]).unwrap();
    let y = nl.add_output("y", 4).unwrap();
    nl.connect(y, whole).unwrap();
    nl
}

#[test]
fn test_idempotent() {
    let once = optimized(mixed());
    let twice = optimized(once.clone());
    assert_isomorphic!(once, twice);
}

#[test]
fn test_optimizes_mixed() {
    let nl = optimized(mixed());
    let statistics = nl.statistics();
    // The two additions are merged, and the trivial selections and the buffer elided.
    assert_eq!(statistics[&Opcode::Add], 1);
    assert_eq!(statistics[&Opcode::Select], 1);
    assert_eq!(statistics.get(&Opcode::Buffer), None);
    assert_eq!(statistics.get(&Opcode::And), None);
    assert_eq!(nl.validate(), Ok(()));
}

#[test]
fn test_options_disable_passes() {
    let options = OptimizeOptions { constant_propagation: false, common_subexpressions: false, ..Default::default() };
    let mut nl = mixed();
    optimize(&mut nl, &options).unwrap();
    let statistics = nl.statistics();
    assert_eq!(statistics[&Opcode::Add], 2);
    assert_eq!(statistics[&Opcode::And], 1);
}

#[test]
fn test_cse_distinguishes_operations() {
    let mut nl = Netlist::new();
    let a = nl.add_input("a", 2).unwrap();
    let b = nl.add_input("b", 2).unwrap();
    let values = [
        nl.add_and(a, b).unwrap(),
        nl.add_or(a, b).unwrap(),
        nl.add_select(a, [0, 1]).unwrap(),
        nl.add_select(a, [1, 0]).unwrap(),
        nl.add_sub(a, b).unwrap(),
        nl.add_sub(b, a).unwrap(),
        nl.add_and(b, a).unwrap(),
    ];
    let cat = nl.add_concat(values).unwrap();
    let y = nl.add_output("y", nl.width(cat)).unwrap();
    nl.connect(y, cat).unwrap();
    assert!(merge(&mut nl).unwrap());
    let statistics = nl.statistics();
    assert_eq!(statistics[&Opcode::And], 1);
    assert_eq!(statistics[&Opcode::Or], 1);
    assert_eq!(statistics[&Opcode::Select], 2);
    assert_eq!(statistics[&Opcode::Sub], 2);
}

#[test]
fn test_one_bit_constant_truth_tables() {
    for op in [Opcode::And, Opcode::Or, Opcode::Xor, Opcode::Nand] {
        for constant in [0, 1] {
            for swapped in [false, true] {
                let mut nl = Netlist::new();
                let a = nl.add_input("a", 1).unwrap();
                let c = nl.add_const(constant, 1).unwrap();
                let t = nl.add_named_wire("t", 1).unwrap();
                let args = if swapped { [a, c] } else { [c, a] };
                nl.add_operation(Operation::new(op, args, t)).unwrap();
                let y = nl.add_output("y", 1).unwrap();
                nl.connect(y, t).unwrap();
                let nl = optimized(nl);

                let mut sim = Simulation::new(&nl, SimulationOptions::default()).unwrap();
                for value in [0, 1] {
                    sim.step([("a", value)]).unwrap();
                    let operands = if swapped { [value, constant] } else { [constant, value] };
                    let expected = Operation::new(op, Vec::new(), a).evaluate(&operands, &[1, 1], 1);
                    assert_eq!(sim.value("y"), expected, "{op} with {constant} (swapped: {swapped}) on {value}");
                }
            }
        }
    }
}
