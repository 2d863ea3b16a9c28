use std::collections::BTreeMap;

use gatesmith_netlist::{Error, MemoryId, Netlist, Opcode, Operation, Role, SignalId};

/// Opcodes left in a netlist after [`synthesize`]. Concatenations and selections only rename bits:
/// they reassemble multi-bit inputs, outputs and memory ports.
pub const SYNTHESIZED_OPS: [Opcode; 10] = [
    Opcode::Not,
    Opcode::And,
    Opcode::Or,
    Opcode::Xor,
    Opcode::Buffer,
    Opcode::Reg,
    Opcode::Concat,
    Opcode::Select,
    Opcode::MemRead,
    Opcode::MemWrite,
];

/// How the state of a synthesized netlist relates to the netlist it was synthesized from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SynthesisMap {
    /// Per-bit register names for every original register, least significant bit first.
    pub registers: BTreeMap<String, Vec<String>>,
    /// Memory handles in the synthesized netlist, by name.
    pub memories: BTreeMap<String, MemoryId>,
}

impl SynthesisMap {
    /// Translates initial register values keyed by original register name into values for the
    /// per-bit registers. Names that are not original registers are passed through unchanged.
    pub fn register_values(&self, values: &BTreeMap<String, u128>) -> BTreeMap<String, u128> {
        let mut result = BTreeMap::new();
        for (name, &value) in values {
            match self.registers.get(name) {
                Some(bits) => {
                    for (index, bit_name) in bits.iter().enumerate() {
                        let bit = value.checked_shr(index as u32).unwrap_or(0) & 1;
                        result.insert(bit_name.clone(), bit);
                    }
                }
                None => {
                    result.insert(name.clone(), value);
                }
            }
        }
        result
    }
}

/// A bit that is known to be zero is `None`, so that arithmetic does not build gates for it.
type Bit = Option<SignalId>;

struct Synthesizer<'a> {
    source: &'a Netlist,
    target: Netlist,
    bits: BTreeMap<SignalId, Vec<SignalId>>,
    consts: [Option<SignalId>; 2],
}

impl Synthesizer<'_> {
    fn constant(&mut self, value: bool) -> Result<SignalId, Error> {
        if let Some(id) = self.consts[value as usize] {
            return Ok(id);
        }
        let id = self.target.add_const(value as u128, 1)?;
        self.consts[value as usize] = Some(id);
        Ok(id)
    }

    fn resolve(&mut self, bit: Bit) -> Result<SignalId, Error> {
        match bit {
            Some(signal) => Ok(signal),
            None => self.constant(false),
        }
    }

    /// Bits of a source signal as target signals, least significant first.
    fn bits_of(&mut self, signal: SignalId) -> Result<Vec<SignalId>, Error> {
        if let Some(bits) = self.bits.get(&signal) {
            return Ok(bits.clone());
        }
        let netlist = self.source;
        let source = netlist.signal(signal);
        let bits = match source.role {
            Role::Const(value) => (0..source.width)
                .map(|index| self.constant(value >> index & 1 != 0))
                .collect::<Result<Vec<_>, _>>()?,
            Role::Input => {
                let input = self.target.find_signal(&source.name).ok_or_else(|| {
                    Error::internal(format!("input {:?} is missing from the synthesized netlist", source.name))
                })?;
                if source.width == 1 {
                    vec![input]
                } else {
                    (0..source.width).map(|index| self.target.add_bit(input, index)).collect::<Result<Vec<_>, _>>()?
                }
            }
            _ => return Err(Error::internal(format!("{} is used before it is synthesized", source))),
        };
        self.bits.insert(signal, bits.clone());
        Ok(bits)
    }

    /// Joins bits into one signal, for ports that need a multi-bit value.
    fn gather(&mut self, bits: &[SignalId]) -> Result<SignalId, Error> {
        match bits {
            &[bit] => Ok(bit),
            _ => self.target.add_concat(bits.iter().rev().copied().collect::<Vec<_>>()),
        }
    }

    fn and(&mut self, a: SignalId, b: SignalId) -> Result<SignalId, Error> {
        self.target.add_and(a, b)
    }

    fn or(&mut self, a: SignalId, b: SignalId) -> Result<SignalId, Error> {
        self.target.add_or(a, b)
    }

    fn xor(&mut self, a: SignalId, b: SignalId) -> Result<SignalId, Error> {
        self.target.add_xor(a, b)
    }

    fn not(&mut self, a: SignalId) -> Result<SignalId, Error> {
        self.target.add_not(a)
    }

    /// Adds up to three bits, returning the sum and the carry.
    fn full_add(&mut self, x: Bit, y: Bit, carry: Bit) -> Result<(Bit, Bit), Error> {
        let present: Vec<SignalId> = [x, y, carry].into_iter().flatten().collect();
        Ok(match present[..] {
            [] => (None, None),
            [a] => (Some(a), None),
            [a, b] => (Some(self.xor(a, b)?), Some(self.and(a, b)?)),
            [a, b, c] => {
                let half = self.xor(a, b)?;
                let sum = self.xor(half, c)?;
                let generate = self.and(a, b)?;
                let propagate = self.and(c, half)?;
                (Some(sum), Some(self.or(generate, propagate)?))
            }
            _ => unreachable!(),
        })
    }

    /// Ripple-carry addition producing `width` result bits; the carry out lands past the operands.
    fn ripple(&mut self, x: &[Bit], y: &[Bit], mut carry: Bit, width: usize) -> Result<Vec<Bit>, Error> {
        let mut result = Vec::with_capacity(width);
        for index in 0..width {
            let (sum, carry_out) =
                self.full_add(x.get(index).copied().flatten(), y.get(index).copied().flatten(), carry)?;
            result.push(sum);
            carry = carry_out;
        }
        Ok(result)
    }

    /// Carry out of `a + !b + 1`, which is set unless `a < b`.
    fn no_borrow(&mut self, a: &[SignalId], b: &[SignalId]) -> Result<SignalId, Error> {
        let mut carry = Some(self.constant(true)?);
        for (&a, &b) in a.iter().zip(b) {
            let b_inv = self.not(b)?;
            (_, carry) = self.full_add(Some(a), Some(b_inv), carry)?;
        }
        self.resolve(carry)
    }

    fn reduce_or(&mut self, bits: Vec<SignalId>) -> Result<SignalId, Error> {
        let mut bits = bits;
        while bits.len() > 1 {
            for chunk in std::mem::take(&mut bits).chunks(2) {
                match *chunk {
                    [a, b] => bits.push(self.or(a, b)?),
                    [a] => bits.push(a),
                    _ => unreachable!(),
                }
            }
        }
        match bits.first() {
            Some(&bit) => Ok(bit),
            None => self.constant(false),
        }
    }

    fn bitwise(
        &mut self,
        a: &[SignalId],
        b: &[SignalId],
        mut gate: impl FnMut(&mut Self, SignalId, SignalId) -> Result<SignalId, Error>,
    ) -> Result<Vec<SignalId>, Error> {
        a.iter().zip(b).map(|(&a, &b)| gate(self, a, b)).collect()
    }

    /// Lowers one operation. Returns the bits of its destination, or `None` if the operation has no
    /// destination or drives registers directly.
    fn lower(&mut self, operation: &Operation) -> Result<Option<Vec<SignalId>>, Error> {
        let args = operation.args.iter().map(|&arg| self.bits_of(arg)).collect::<Result<Vec<_>, _>>()?;
        let bits: Vec<SignalId> = match operation.op {
            Opcode::Buffer => args[0].clone(),
            Opcode::Not => args[0].iter().map(|&a| self.not(a)).collect::<Result<_, _>>()?,
            Opcode::And => self.bitwise(&args[0], &args[1], Self::and)?,
            Opcode::Or => self.bitwise(&args[0], &args[1], Self::or)?,
            Opcode::Xor => self.bitwise(&args[0], &args[1], Self::xor)?,
            Opcode::Nand => self.bitwise(&args[0], &args[1], |this, a, b| {
                let and = this.and(a, b)?;
                this.not(and)
            })?,
            Opcode::Add | Opcode::Mul | Opcode::Sub => {
                let width = args[0].len();
                let result = match operation.op {
                    Opcode::Add => {
                        let a: Vec<Bit> = args[0].iter().map(|&a| Some(a)).collect();
                        let b: Vec<Bit> = args[1].iter().map(|&b| Some(b)).collect();
                        self.ripple(&a, &b, None, width + 1)?
                    }
                    Opcode::Sub => {
                        let a: Vec<Bit> = args[0].iter().map(|&a| Some(a)).collect();
                        let b_inv: Vec<Bit> =
                            args[1].iter().map(|&b| self.not(b).map(Some)).collect::<Result<_, _>>()?;
                        let carry = Some(self.constant(true)?);
                        let mut result = self.ripple(&a, &b_inv, carry, width + 1)?;
                        let borrow = self.resolve(result[width])?;
                        result[width] = Some(self.not(borrow)?);
                        result
                    }
                    _ => {
                        // Shift-and-add, keeping only as many product bits as the destination needs.
                        let dest_width = self.source.width(operation.dests[0]) as usize;
                        let mut acc: Vec<Bit> = vec![None; dest_width];
                        for (shift, &b) in args[1].iter().enumerate().take(dest_width) {
                            let mut row: Vec<Bit> = vec![None; shift];
                            for &a in &args[0] {
                                row.push(Some(self.and(a, b)?));
                            }
                            acc = self.ripple(&acc, &row, None, dest_width)?;
                        }
                        acc
                    }
                };
                result.into_iter().map(|bit| self.resolve(bit)).collect::<Result<_, _>>()?
            }
            Opcode::Eq => {
                let diff = self.bitwise(&args[0], &args[1], Self::xor)?;
                let any = self.reduce_or(diff)?;
                vec![self.not(any)?]
            }
            Opcode::Lt => {
                let no_borrow = self.no_borrow(&args[0], &args[1])?;
                vec![self.not(no_borrow)?]
            }
            Opcode::Gt => {
                let no_borrow = self.no_borrow(&args[1], &args[0])?;
                vec![self.not(no_borrow)?]
            }
            Opcode::Mux => {
                let sel = args[0][0];
                let sel_inv = self.not(sel)?;
                let mut bits = vec![];
                for (&if_zero, &if_one) in args[1].iter().zip(&args[2]) {
                    let lo = self.and(sel_inv, if_zero)?;
                    let hi = self.and(sel, if_one)?;
                    bits.push(self.or(lo, hi)?);
                }
                bits
            }
            Opcode::Concat => args.iter().rev().flatten().copied().collect(),
            Opcode::Select => {
                let Some(select) = operation.param.as_select() else {
                    return Err(Error::internal("selection without a bit list"));
                };
                select.iter().map(|&bit| args[0][bit as usize]).collect()
            }
            Opcode::Reg => {
                let dest = operation.dests[0];
                let registers = self.bits_of(dest)?;
                for (&register, &next) in registers.iter().zip(&args[0]) {
                    self.target.set_next(register, next)?;
                }
                return Ok(None);
            }
            Opcode::MemRead => {
                let Some(memory) = operation.param.as_memory() else {
                    return Err(Error::internal("memory read without a memory"));
                };
                let addr = self.gather(&args[0])?;
                let data = self.target.add_mem_read(memory, addr)?;
                let data_width = self.target.memory(memory).data_width;
                if data_width == 1 {
                    vec![data]
                } else {
                    (0..data_width).map(|index| self.target.add_bit(data, index)).collect::<Result<_, _>>()?
                }
            }
            Opcode::MemWrite => {
                let Some(memory) = operation.param.as_memory() else {
                    return Err(Error::internal("memory write without a memory"));
                };
                let addr = self.gather(&args[0])?;
                let data = self.gather(&args[1])?;
                self.target.add_mem_write(memory, addr, data, args[2][0])?;
                return Ok(None);
            }
        };
        let dest_width = self.source.width(operation.dests[0]) as usize;
        if bits.len() < dest_width {
            return Err(Error::internal(format!(
                "lowering `{}` produced {} bits",
                self.source.display_operation(operation),
                bits.len()
            )));
        }
        Ok(Some(bits[..dest_width].to_vec()))
    }
}

/// Lowers a netlist to 1-bit `and`, `or`, `xor` and `not` gates, 1-bit registers and memory ports.
///
/// Inputs, outputs and memories keep their names and widths; concatenations and selections remain
/// only to assemble and disassemble multi-bit inputs, outputs and memory ports. Registers are split
/// into one register per bit, named `name[index]` (a 1-bit register keeps its name).
pub fn synthesize(netlist: &Netlist) -> Result<(Netlist, SynthesisMap), Error> {
    netlist.validate()?;
    let order = netlist.dependency_order()?;

    let mut synth = Synthesizer { source: netlist, target: Netlist::new(), bits: BTreeMap::new(), consts: [None; 2] };
    let mut map = SynthesisMap::default();
    for (_, memory) in netlist.memories() {
        let id = synth.target.add_memory(memory.clone())?;
        map.memories.insert(memory.name.clone(), id);
    }
    for id in netlist.inputs() {
        let signal = netlist.signal(id);
        synth.target.add_input(signal.name.clone(), signal.width)?;
    }
    let mut outputs = BTreeMap::new();
    for id in netlist.outputs() {
        let signal = netlist.signal(id);
        outputs.insert(id, synth.target.add_output(signal.name.clone(), signal.width)?);
    }
    for id in netlist.registers() {
        let signal = netlist.signal(id);
        let bits = if signal.width == 1 {
            vec![synth.target.add_register(signal.name.clone(), 1)?]
        } else {
            let mut bits = vec![];
            for index in 0..signal.width {
                let name = synth.target.unique_name(&format!("{}[{index}]", signal.name));
                bits.push(synth.target.add_register(name, 1)?);
            }
            bits
        };
        let names = bits.iter().map(|&bit| synth.target.signal(bit).name.clone()).collect();
        map.registers.insert(signal.name.clone(), names);
        synth.bits.insert(id, bits);
    }

    for index in order {
        let operation = &netlist.operations()[index];
        let before = synth.target.operation_count();
        if let Some(bits) = synth.lower(operation)? {
            let dest = operation.dests[0];
            match outputs.get(&dest) {
                Some(&output) if bits.len() == 1 => {
                    synth.target.add_operation(Operation::new(Opcode::Buffer, bits, output))?;
                }
                Some(&output) => {
                    let msb_first: Vec<SignalId> = bits.into_iter().rev().collect();
                    synth.target.add_operation(Operation::new(Opcode::Concat, msb_first, output))?;
                }
                None => {
                    synth.bits.insert(dest, bits);
                }
            }
        }
        log::trace!(
            "synthesize: `{}` became {} operations",
            netlist.display_operation(operation),
            synth.target.operation_count() - before
        );
    }

    let mut target = synth.target;
    target.set_legal_ops(SYNTHESIZED_OPS);
    crate::check_pass_result(&target, "synthesize")?;
    log::info!("synthesize: {} -> {} operations", netlist.operation_count(), target.operation_count());
    Ok((target, map))
}
