use std::fmt::{Debug, Display};

/// Widest signal the netlist can carry; values are stored as `u128`.
pub const MAX_WIDTH: u32 = 128;

/// Handle to a signal owned by a [`Netlist`](crate::Netlist).
///
/// Handles are stable: removing a signal leaves its slot vacant instead of renumbering the others.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(pub(crate) u32);

impl SignalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "SignalId({})", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Plain,
    Input,
    Output,
    Register,
    /// A constant; the value always fits in the signal's width.
    Const(u128),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signal {
    pub name: String,
    pub width: u32,
    pub role: Role,
    /// Set for wires and constants named by the netlist rather than by the user.
    pub generated: bool,
}

impl Signal {
    pub fn new(name: impl Into<String>, width: u32, role: Role) -> Signal {
        Signal { name: name.into(), width, role, generated: false }
    }

    pub fn plain(name: impl Into<String>, width: u32) -> Signal {
        Signal::new(name, width, Role::Plain)
    }

    pub fn input(name: impl Into<String>, width: u32) -> Signal {
        Signal::new(name, width, Role::Input)
    }

    pub fn output(name: impl Into<String>, width: u32) -> Signal {
        Signal::new(name, width, Role::Output)
    }

    pub fn register(name: impl Into<String>, width: u32) -> Signal {
        Signal::new(name, width, Role::Register)
    }

    pub fn constant(name: impl Into<String>, width: u32, value: u128) -> Signal {
        Signal::new(name, width, Role::Const(value))
    }

    pub fn is_input(&self) -> bool {
        self.role == Role::Input
    }

    pub fn is_output(&self) -> bool {
        self.role == Role::Output
    }

    pub fn is_register(&self) -> bool {
        self.role == Role::Register
    }

    pub fn as_const(&self) -> Option<u128> {
        match self.role {
            Role::Const(value) => Some(value),
            _ => None,
        }
    }

    /// Inputs and constants have a value without being driven by any operation.
    pub fn is_terminal(&self) -> bool {
        matches!(self.role, Role::Input | Role::Const(_))
    }

    pub fn mask(&self) -> u128 {
        mask(self.width)
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.role {
            Role::Const(value) => write!(f, "{}'d{}", self.width, value),
            _ => write!(f, "%{}", self.name),
        }
    }
}

/// All-ones mask for a value `width` bits wide.
pub fn mask(width: u32) -> u128 {
    if width >= u128::BITS {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Number of bits needed to represent `value`; zero needs one bit.
pub fn bits_for(value: u128) -> u32 {
    (u128::BITS - value.leading_zeros()).max(1)
}
