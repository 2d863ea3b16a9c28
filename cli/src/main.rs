use std::{error::Error, io::Write};

use gatesmith_generic::{and_inverter_synth, nand_synth, optimize, synthesize, OptimizeOptions};
use gatesmith_netlist::Netlist;
use gatesmith_sim::{Simulation, SimulationOptions, TraceSelection};

fn build_counter(width: u32) -> Result<Netlist, Box<dyn Error>> {
    let mut netlist = Netlist::new();
    let count = netlist.add_register("count", width)?;
    let one = netlist.add_const(1, width)?;
    let sum = netlist.add_add(count, one)?;
    let next = netlist.add_select(sum, (0..width).collect::<Vec<u32>>())?;
    netlist.set_next(count, next)?;
    let out = netlist.add_output("out", width)?;
    netlist.connect(out, count)?;
    Ok(netlist)
}

fn build_adder(width: u32) -> Result<Netlist, Box<dyn Error>> {
    let mut netlist = Netlist::new();
    let a = netlist.add_input("a", width)?;
    let b = netlist.add_input("b", width)?;
    let sum = netlist.add_add(a, b)?;
    let out = netlist.add_output("sum", width + 1)?;
    netlist.connect(out, sum)?;
    Ok(netlist)
}

fn build_circuit(name: &str, width: u32) -> Result<Netlist, Box<dyn Error>> {
    match name {
        "counter" => build_counter(width),
        "adder" => build_adder(width),
        _ => Err(format!("unknown circuit {name:?} (expected `counter` or `adder`)").into()),
    }
}

fn process(netlist: Netlist, do_optimize: bool, do_synthesize: bool, gates: &str) -> Result<Netlist, Box<dyn Error>> {
    let mut netlist = netlist;
    if do_optimize {
        optimize(&mut netlist, &OptimizeOptions::default())?;
    }
    if do_synthesize || gates != "and-or" {
        let (synthesized, _) = synthesize(&netlist)?;
        netlist = synthesized;
        if do_optimize {
            optimize(&mut netlist, &OptimizeOptions::default())?;
        }
    }
    match gates {
        "and-or" => (),
        "nand" => nand_synth(&mut netlist)?,
        "and-inverter" => and_inverter_synth(&mut netlist)?,
        _ => return Err(format!("unknown gate set {gates:?} (expected `and-or`, `nand` or `and-inverter`)").into()),
    }
    Ok(netlist)
}

/// Input values for one cycle: every input counts up at its own pace.
fn stimulus(netlist: &Netlist, cycle: u128) -> Vec<(String, u128)> {
    netlist
        .inputs()
        .enumerate()
        .map(|(index, id)| {
            let signal = netlist.signal(id);
            let value = cycle.wrapping_mul(2 * index as u128 + 1).wrapping_add(index as u128) & signal.mask();
            (signal.name.clone(), value)
        })
        .collect()
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut version = false;
    let mut circuit = "counter".to_owned();
    let mut width = 4u32;
    let mut cycles = 8usize;
    let mut do_optimize = false;
    let mut do_synthesize = false;
    let mut gates = "and-or".to_owned();
    let mut print_netlist = false;
    {
        let mut parser = argparse::ArgumentParser::new();
        parser.set_description("Build a demo circuit, run it through the pipeline and simulate it.");
        parser.refer(&mut version).add_option(&["--version"], argparse::StoreTrue, "Display version");
        parser.refer(&mut circuit).add_option(&["-c", "--circuit"], argparse::Store, "Circuit (counter, adder)");
        parser.refer(&mut width).add_option(&["-w", "--width"], argparse::Store, "Data width in bits");
        parser.refer(&mut cycles).add_option(&["-n", "--cycles"], argparse::Store, "Number of cycles to simulate");
        parser.refer(&mut do_optimize).add_option(&["-O", "--optimize"], argparse::StoreTrue, "Optimize");
        parser.refer(&mut do_synthesize).add_option(&["-s", "--synthesize"], argparse::StoreTrue, "Lower to gates");
        parser.refer(&mut gates).add_option(&["--gates"], argparse::Store, "Gate set (and-or, nand, and-inverter)");
        parser.refer(&mut print_netlist).add_option(&["-p", "--print-netlist"], argparse::StoreTrue, "Print netlist");
        parser.parse_args_or_exit();
    }

    if version {
        println!("gatesmith {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if width == 0 || width > 64 {
        return Err(format!("width must be between 1 and 64, not {width}").into());
    }

    let netlist = build_circuit(&circuit, width)?;
    let netlist = process(netlist, do_optimize, do_synthesize, &gates)?;
    let mut stdout = std::io::stdout().lock();
    if print_netlist {
        write!(stdout, "{netlist}")?;
        writeln!(stdout, "; operation counts:")?;
        for (op, amount) in netlist.statistics() {
            writeln!(stdout, "; {:>7} {}", amount, op)?;
        }
    }

    let traced = TraceSelection::Signals(
        netlist.inputs().chain(netlist.outputs()).map(|id| netlist.signal(id).name.clone()).collect(),
    );
    let mut sim = Simulation::new(&netlist, SimulationOptions { traced, ..SimulationOptions::default() })?;
    for cycle in 0..cycles {
        let inputs = stimulus(&netlist, cycle as u128);
        sim.step(inputs.iter().map(|(name, value)| (name.as_str(), *value)))?;
    }
    sim.trace().print_trace(&mut stdout)?;
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        eprintln!("error: {}", error);
        std::process::exit(1)
    }
}
