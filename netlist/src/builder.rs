use crate::{Error, MemoryId, Opcode, Operation, SignalId};

// Each builder allocates a fresh wire of the natural result width, drives it with a single operation,
// and returns the wire. The width expression sees the width of the first argument as `$w`.
macro_rules! builder_fn {
    () => {};

    ($func:ident( $($arg:ident),+ ) -> $op:ident [$w:ident => $width:expr]; $($rest:tt)*) => {
        pub fn $func(&mut self, $( $arg: SignalId ),+) -> Result<SignalId, Error> {
            let args = vec![$( $arg ),+];
            let $w = self.width(args[0]);
            self.add_driven_wire($width, |dest| Operation::new(Opcode::$op, args, dest))
        }

        builder_fn!{ $($rest)* }
    };
}

impl crate::Netlist {
    builder_fn! {
        add_buf(arg) -> Buffer [w => w];
        add_not(arg) -> Not [w => w];
        add_and(arg1, arg2) -> And [w => w];
        add_or(arg1, arg2) -> Or [w => w];
        add_xor(arg1, arg2) -> Xor [w => w];
        add_nand(arg1, arg2) -> Nand [w => w];
        add_add(arg1, arg2) -> Add [w => w + 1];
        add_sub(arg1, arg2) -> Sub [w => w + 1];
        add_mul(arg1, arg2) -> Mul [w => 2 * w];
        add_eq(arg1, arg2) -> Eq [_w => 1];
        add_lt(arg1, arg2) -> Lt [_w => 1];
        add_gt(arg1, arg2) -> Gt [_w => 1];
    }

    /// Selects `if_one` when `sel` is 1, and `if_zero` otherwise.
    pub fn add_mux(&mut self, sel: SignalId, if_zero: SignalId, if_one: SignalId) -> Result<SignalId, Error> {
        self.add_driven_wire(self.width(if_zero), |dest| Operation::new(Opcode::Mux, [sel, if_zero, if_one], dest))
    }

    /// Concatenates signals, most significant first.
    pub fn add_concat(&mut self, args: impl Into<Vec<SignalId>>) -> Result<SignalId, Error> {
        let args = args.into();
        let width = args.iter().map(|&arg| self.width(arg)).sum();
        self.add_driven_wire(width, |dest| Operation::new(Opcode::Concat, args, dest))
    }

    pub fn add_select(&mut self, arg: SignalId, bits: impl Into<Vec<u32>>) -> Result<SignalId, Error> {
        let bits = bits.into();
        self.add_driven_wire(bits.len() as u32, |dest| Operation::select(arg, bits, dest))
    }

    pub fn add_bit(&mut self, arg: SignalId, bit: u32) -> Result<SignalId, Error> {
        self.add_select(arg, [bit])
    }

    pub fn add_mem_read(&mut self, memory: MemoryId, addr: SignalId) -> Result<SignalId, Error> {
        self.add_driven_wire(self.memory(memory).data_width, |dest| Operation::mem_read(memory, addr, dest))
    }

    pub fn add_mem_write(
        &mut self,
        memory: MemoryId,
        addr: SignalId,
        data: SignalId,
        enable: SignalId,
    ) -> Result<(), Error> {
        self.add_operation(Operation::mem_write(memory, addr, data, enable))
    }

    /// Drives `dest` (typically an output or a named wire) from `src` through a buffer.
    pub fn connect(&mut self, dest: SignalId, src: SignalId) -> Result<(), Error> {
        self.add_operation(Operation::new(Opcode::Buffer, [src], dest))
    }

    /// Makes `next` the value `register` takes at the next clock edge.
    pub fn set_next(&mut self, register: SignalId, next: SignalId) -> Result<(), Error> {
        self.add_operation(Operation::new(Opcode::Reg, [next], register))
    }
}
