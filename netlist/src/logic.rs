use crate::signal::mask;
use crate::{Opcode, Operation};

impl Operation {
    /// Computes the result of a combinational operation from its argument values.
    ///
    /// `args` holds one value per argument and `widths` the matching argument widths; the result is
    /// masked to `dest_width`. Memory ports have no value of their own and return `None`; a register
    /// operation yields the value its destination takes at the next clock edge.
    pub fn evaluate(&self, args: &[u128], widths: &[u32], dest_width: u32) -> Option<u128> {
        let value = match self.op {
            Opcode::Buffer | Opcode::Reg => args[0],
            Opcode::Not => !args[0],
            Opcode::And => args[0] & args[1],
            Opcode::Or => args[0] | args[1],
            Opcode::Xor => args[0] ^ args[1],
            Opcode::Nand => !(args[0] & args[1]),
            Opcode::Add => args[0].wrapping_add(args[1]),
            Opcode::Sub => args[0].wrapping_sub(args[1]),
            Opcode::Mul => args[0].wrapping_mul(args[1]),
            Opcode::Eq => (args[0] == args[1]) as u128,
            Opcode::Lt => (args[0] < args[1]) as u128,
            Opcode::Gt => (args[0] > args[1]) as u128,
            Opcode::Mux => {
                if args[0] & 1 != 0 {
                    args[2]
                } else {
                    args[1]
                }
            }
            Opcode::Concat => args.iter().zip(widths).fold(0u128, |acc, (&value, &width)| {
                acc.checked_shl(width).unwrap_or(0) | (value & mask(width))
            }),
            Opcode::Select => {
                let bits = self.param.as_select()?;
                bits.iter()
                    .enumerate()
                    .fold(0u128, |acc, (index, &bit)| acc | (((args[0] >> bit) & 1) << index))
            }
            Opcode::MemRead | Opcode::MemWrite => return None,
        };
        Some(value & mask(dest_width))
    }
}
