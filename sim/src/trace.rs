use std::collections::BTreeMap;
use std::fmt::Display;

use gatesmith_netlist::{Netlist, SignalId};

use crate::SimulationError;

/// Signal values at the end of one simulated cycle.
pub struct SignalValues<'a> {
    pub(crate) netlist: &'a Netlist,
    pub(crate) values: &'a [u128],
}

impl SignalValues<'_> {
    pub fn get(&self, name: &str) -> Option<u128> {
        self.netlist.find_signal(name).map(|id| self.values[id.index()])
    }

    pub fn get_by_id(&self, id: SignalId) -> u128 {
        self.values[id.index()]
    }

    pub fn netlist(&self) -> &Netlist {
        self.netlist
    }
}

/// Receives the values of every signal after each simulated cycle.
pub trait Tracer {
    /// Called once before the first cycle.
    fn start(&mut self, _netlist: &Netlist) -> Result<(), SimulationError> {
        Ok(())
    }

    fn record(&mut self, cycle: usize, values: &SignalValues<'_>);
}

impl Tracer for () {
    fn record(&mut self, _cycle: usize, _values: &SignalValues<'_>) {}
}

/// Which signals a [`SimulationTrace`] records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TraceSelection {
    All,
    /// Every signal except wires and constants the netlist named itself.
    #[default]
    Named,
    Signals(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NameChunk<'a> {
    Number(u128),
    Text(&'a str),
}

/// Orders `r2` before `r10`.
fn natural_key(name: &str) -> Vec<NameChunk<'_>> {
    let mut chunks = vec![];
    let mut rest = name;
    while let Some(first) = rest.chars().next() {
        let is_digit = first.is_ascii_digit();
        let end = rest.find(|c: char| c.is_ascii_digit() != is_digit).unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);
        chunks.push(match chunk.parse() {
            Ok(number) if is_digit => NameChunk::Number(number),
            _ => NameChunk::Text(chunk),
        });
        rest = tail;
    }
    chunks
}

/// Per-cycle values of a selection of named signals.
#[derive(Clone, Debug, Default)]
pub struct SimulationTrace {
    selection: TraceSelection,
    signals: Vec<(String, SignalId)>,
    values: BTreeMap<String, Vec<u128>>,
    cycles: usize,
}

impl SimulationTrace {
    pub fn new(selection: TraceSelection) -> SimulationTrace {
        SimulationTrace { selection, ..SimulationTrace::default() }
    }

    /// Number of recorded cycles.
    pub fn len(&self) -> usize {
        self.cycles
    }

    pub fn is_empty(&self) -> bool {
        self.cycles == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn values(&self, name: &str) -> Option<&[u128]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Writes one line per signal: the name, right-aligned, followed by its value in every cycle.
    pub fn print_trace(&self, writer: &mut impl std::io::Write) -> std::io::Result<()> {
        write!(writer, "{self}")
    }
}

impl Tracer for SimulationTrace {
    fn start(&mut self, netlist: &Netlist) -> Result<(), SimulationError> {
        self.signals = match &self.selection {
            TraceSelection::All => netlist.signals().map(|(id, signal)| (signal.name.clone(), id)).collect(),
            TraceSelection::Named => netlist
                .signals()
                .filter(|(_, signal)| !signal.generated)
                .map(|(id, signal)| (signal.name.clone(), id))
                .collect(),
            TraceSelection::Signals(names) => names
                .iter()
                .map(|name| match netlist.find_signal(name) {
                    Some(id) => Ok((name.clone(), id)),
                    None => Err(SimulationError::UnknownSignal(name.clone())),
                })
                .collect::<Result<_, _>>()?,
        };
        self.values = self.signals.iter().map(|(name, _)| (name.clone(), vec![])).collect();
        self.cycles = 0;
        Ok(())
    }

    fn record(&mut self, _cycle: usize, values: &SignalValues<'_>) {
        for (name, id) in &self.signals {
            if let Some(trace) = self.values.get_mut(name) {
                trace.push(values.get_by_id(*id));
            }
        }
        self.cycles += 1;
    }
}

impl Display for SimulationTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_by_cached_key(|name| natural_key(*name));
        let name_width = names.iter().map(|name| name.len()).max().unwrap_or(0);
        for name in names {
            write!(f, "{name:>name_width$}")?;
            for value in &self.values[name] {
                write!(f, " {value}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
