use std::fmt::Display;

use crate::{MemoryId, SignalId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Opcode {
    Buffer,
    Not,
    And,
    Or,
    Xor,
    Nand,
    Add,
    Sub,
    Mul,
    Eq,
    Lt,
    Gt,
    Mux, // s ? b : a, with args (s, a, b)
    Concat,
    Select,
    Reg,
    MemRead,
    MemWrite,
}

impl Opcode {
    pub const ALL: [Opcode; 18] = [
        Opcode::Buffer,
        Opcode::Not,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Nand,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Eq,
        Opcode::Lt,
        Opcode::Gt,
        Opcode::Mux,
        Opcode::Concat,
        Opcode::Select,
        Opcode::Reg,
        Opcode::MemRead,
        Opcode::MemWrite,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Buffer => "buf",
            Opcode::Not => "not",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Nand => "nand",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Eq => "eq",
            Opcode::Lt => "lt",
            Opcode::Gt => "gt",
            Opcode::Mux => "mux",
            Opcode::Concat => "concat",
            Opcode::Select => "select",
            Opcode::Reg => "reg",
            Opcode::MemRead => "memread",
            Opcode::MemWrite => "memwrite",
        }
    }

    /// Number of arguments, or `None` for variadic opcodes.
    pub fn arity(self) -> Option<usize> {
        match self {
            Opcode::Buffer | Opcode::Not | Opcode::Select | Opcode::Reg | Opcode::MemRead => Some(1),
            Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Nand
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Eq
            | Opcode::Lt
            | Opcode::Gt => Some(2),
            Opcode::Mux | Opcode::MemWrite => Some(3),
            Opcode::Concat => None,
        }
    }

    pub fn dest_count(self) -> usize {
        match self {
            Opcode::MemWrite => 0,
            _ => 1,
        }
    }

    /// Operations whose result is a pure function of their arguments within one cycle.
    pub fn is_combinational(self) -> bool {
        !matches!(self, Opcode::Reg | Opcode::MemWrite)
    }

    /// Operations that only move bits around, and may sit between a register and a memory read port.
    pub fn is_transparent(self) -> bool {
        matches!(self, Opcode::Buffer | Opcode::Concat | Opcode::Select)
    }

    pub fn is_commutative(self) -> bool {
        matches!(self, Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Nand | Opcode::Add | Opcode::Mul)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, Opcode::Not | Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Nand)
    }

    pub fn is_memory(self) -> bool {
        matches!(self, Opcode::MemRead | Opcode::MemWrite)
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// A set of opcodes, used to restrict which operations a netlist accepts.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpcodeSet(u32);

impl OpcodeSet {
    pub const EMPTY: OpcodeSet = OpcodeSet(0);
    pub const ALL: OpcodeSet = OpcodeSet((1 << Opcode::ALL.len()) - 1);

    pub fn contains(self, op: Opcode) -> bool {
        self.0 & (1 << op as u32) != 0
    }

    pub fn insert(&mut self, op: Opcode) {
        self.0 |= 1 << op as u32;
    }

    pub fn remove(&mut self, op: Opcode) {
        self.0 &= !(1 << op as u32);
    }

    pub fn iter(self) -> impl Iterator<Item = Opcode> {
        Opcode::ALL.into_iter().filter(move |&op| self.contains(op))
    }
}

impl Default for OpcodeSet {
    fn default() -> Self {
        OpcodeSet::ALL
    }
}

impl FromIterator<Opcode> for OpcodeSet {
    fn from_iter<T: IntoIterator<Item = Opcode>>(iter: T) -> Self {
        let mut set = OpcodeSet::EMPTY;
        for op in iter {
            set.insert(op);
        }
        set
    }
}

impl<const N: usize> From<[Opcode; N]> for OpcodeSet {
    fn from(ops: [Opcode; N]) -> Self {
        OpcodeSet::from_iter(ops)
    }
}

impl std::fmt::Debug for OpcodeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Display for OpcodeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{{")?;
        for (index, op) in self.iter().enumerate() {
            if index != 0 {
                write!(f, ",")?;
            }
            write!(f, " {op}")?;
        }
        write!(f, " }}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpParam {
    None,
    /// Source bit for each destination bit, least significant first. Repeats are allowed.
    Select(Vec<u32>),
    Memory(MemoryId),
}

impl OpParam {
    pub fn as_select(&self) -> Option<&[u32]> {
        match self {
            OpParam::Select(bits) => Some(bits),
            _ => None,
        }
    }

    pub fn as_memory(&self) -> Option<MemoryId> {
        match self {
            OpParam::Memory(memory) => Some(*memory),
            _ => None,
        }
    }
}

/// A single primitive operation. Operations are never changed in place; passes replace them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Operation {
    pub op: Opcode,
    pub param: OpParam,
    pub args: Vec<SignalId>,
    pub dests: Vec<SignalId>,
}

impl Operation {
    pub fn new(op: Opcode, args: impl Into<Vec<SignalId>>, dest: SignalId) -> Operation {
        Operation { op, param: OpParam::None, args: args.into(), dests: vec![dest] }
    }

    pub fn select(arg: SignalId, bits: impl Into<Vec<u32>>, dest: SignalId) -> Operation {
        Operation { op: Opcode::Select, param: OpParam::Select(bits.into()), args: vec![arg], dests: vec![dest] }
    }

    pub fn mem_read(memory: MemoryId, addr: SignalId, data: SignalId) -> Operation {
        Operation { op: Opcode::MemRead, param: OpParam::Memory(memory), args: vec![addr], dests: vec![data] }
    }

    pub fn mem_write(memory: MemoryId, addr: SignalId, data: SignalId, enable: SignalId) -> Operation {
        Operation { op: Opcode::MemWrite, param: OpParam::Memory(memory), args: vec![addr, data, enable], dests: vec![] }
    }

    /// The single destination of the operation, if it has one.
    pub fn dest(&self) -> Option<SignalId> {
        self.dests.first().copied()
    }

    pub fn visit(&self, mut f: impl FnMut(SignalId)) {
        for &signal in self.args.iter().chain(self.dests.iter()) {
            f(signal)
        }
    }

    pub fn visit_args_mut(&mut self, mut f: impl FnMut(&mut SignalId)) {
        for signal in self.args.iter_mut() {
            f(signal)
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Opcode, OpcodeSet};

    #[test]
    fn test_opcode_set() {
        let mut set = OpcodeSet::from([Opcode::And, Opcode::Not]);
        assert!(set.contains(Opcode::And));
        assert!(!set.contains(Opcode::Or));
        set.insert(Opcode::Or);
        set.remove(Opcode::And);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Opcode::Not, Opcode::Or]);
        assert_eq!(set.to_string(), "{ not, or }");
        assert!(Opcode::ALL.into_iter().all(|op| OpcodeSet::ALL.contains(op)));
    }

    #[test]
    fn test_arity() {
        assert_eq!(Opcode::Mux.arity(), Some(3));
        assert_eq!(Opcode::Concat.arity(), None);
        assert_eq!(Opcode::MemWrite.dest_count(), 0);
        assert!(!Opcode::Reg.is_combinational());
        assert!(Opcode::Select.is_transparent());
    }
}
