use std::collections::BTreeSet;

use gatesmith_netlist::{Error, Netlist};

mod elide;
mod constprop;
mod dead_code;
mod merge;
mod synthesize;
mod gates;

pub use elide::{buffer_elision, slice_elision};
pub use constprop::constant_propagation;
pub use dead_code::dead_code;
pub use merge::merge;
pub use synthesize::{synthesize, SynthesisMap, SYNTHESIZED_OPS};
pub use gates::{and_inverter_synth, nand_synth};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeOptions {
    /// Upper bound on the number of rounds of the whole pass sequence.
    pub max_iterations: usize,
    /// Stop early once a round removes no more than this many operations.
    pub min_shrink: usize,
    pub constant_propagation: bool,
    pub common_subexpressions: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        OptimizeOptions { max_iterations: 32, min_shrink: 0, constant_propagation: true, common_subexpressions: true }
    }
}

/// Checks that a pass left the netlist well-formed; any problem is a bug in the pass.
pub(crate) fn check_pass_result(netlist: &Netlist, pass: &str) -> Result<(), Error> {
    netlist.validate().map_err(|error| match error {
        Error::Invalid(_) => Error::internal(format!("{pass} produced an invalid netlist: {error}")),
        error => error,
    })
}

/// Runs every optimization pass repeatedly until the netlist stops changing.
pub fn optimize(netlist: &mut Netlist, options: &OptimizeOptions) -> Result<(), Error> {
    netlist.validate()?;
    netlist.dependency_order()?;
    let used_inputs: BTreeSet<String> = {
        let referenced = netlist.referenced_signals();
        netlist.inputs().filter(|input| referenced.contains(input)).map(|input| netlist.signal(input).name.clone()).collect()
    };
    let initial = netlist.operation_count();
    let mut converged = false;
    for iter in 1..=options.max_iterations {
        let before = netlist.operation_count();
        let did_elide_buffers = buffer_elision(netlist)?;
        let did_elide_slices = slice_elision(netlist)?;
        let did_fold = options.constant_propagation && constant_propagation(netlist)?;
        let did_sweep = dead_code(netlist)?;
        let did_merge = options.common_subexpressions && merge(netlist)?;
        let after = netlist.operation_count();
        log::debug!("optimize #{iter}: {before} -> {after} operations");
        if !(did_elide_buffers || did_elide_slices || did_fold || did_sweep || did_merge) {
            converged = true;
            break;
        }
        if options.min_shrink > 0 && before.saturating_sub(after) < options.min_shrink {
            converged = true;
            break;
        }
    }
    if !converged {
        log::warn!("optimize: stopped after {} rounds without reaching a fixpoint", options.max_iterations);
    }
    check_pass_result(netlist, "optimize")?;

    let referenced = netlist.referenced_signals();
    for input in netlist.inputs() {
        let name = &netlist.signal(input).name;
        if used_inputs.contains(name) && !referenced.contains(&input) {
            log::info!("input {name:?} optimized away as unused");
        }
    }
    log::info!("optimize: {initial} -> {} operations", netlist.operation_count());
    Ok(())
}
