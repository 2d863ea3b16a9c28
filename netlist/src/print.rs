use std::fmt::Display;

use crate::{MemoryId, Netlist, OpParam, Operation, Role, SignalId};

struct DisplayFn<'a, F: for<'b> Fn(&Netlist, &mut std::fmt::Formatter<'b>) -> std::fmt::Result>(&'a Netlist, F);

impl<F: Fn(&Netlist, &mut std::fmt::Formatter) -> std::fmt::Result> Display for DisplayFn<'_, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.1(self.0, f)
    }
}

impl Netlist {
    pub(crate) fn write_string(&self, f: &mut std::fmt::Formatter, str: &str) -> std::fmt::Result {
        if !str.is_empty() && str.bytes().all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'$'))
        {
            write!(f, "{str}")
        } else {
            write!(f, "{str:?}")
        }
    }

    pub(crate) fn write_signal(&self, f: &mut std::fmt::Formatter, signal: SignalId) -> std::fmt::Result {
        match self.get_signal(signal) {
            Some(signal) if signal.as_const().is_some() => write!(f, "{signal}"),
            Some(signal) => {
                write!(f, "%")?;
                self.write_string(f, &signal.name)
            }
            None => write!(f, "%_{}", signal.index()),
        }
    }

    pub(crate) fn write_memory(&self, f: &mut std::fmt::Formatter, memory: MemoryId) -> std::fmt::Result {
        match self.get_memory(memory) {
            Some(memory) => {
                write!(f, "&")?;
                self.write_string(f, &memory.name)
            }
            None => write!(f, "&_{}", memory.index()),
        }
    }

    pub(crate) fn write_operation(&self, f: &mut std::fmt::Formatter, operation: &Operation) -> std::fmt::Result {
        for &dest in &operation.dests {
            self.write_signal(f, dest)?;
            match self.get_signal(dest) {
                Some(signal) => write!(f, ":{} = ", signal.width)?,
                None => write!(f, " = ")?,
            }
        }
        write!(f, "{}", operation.op)?;
        match &operation.param {
            OpParam::None => (),
            OpParam::Select(bits) => {
                write!(f, " [")?;
                for bit in bits {
                    write!(f, " {bit}")?;
                }
                write!(f, " ]")?;
            }
            OpParam::Memory(memory) => {
                write!(f, " ")?;
                self.write_memory(f, *memory)?;
            }
        }
        for &arg in &operation.args {
            write!(f, " ")?;
            self.write_signal(f, arg)?;
        }
        Ok(())
    }

    pub fn display_signal(&self, signal: SignalId) -> impl Display + '_ {
        DisplayFn(self, move |netlist: &Netlist, f| netlist.write_signal(f, signal))
    }

    pub fn display_operation<'a>(&'a self, operation: &'a Operation) -> impl Display + 'a {
        DisplayFn(self, move |netlist: &Netlist, f| netlist.write_operation(f, operation))
    }
}

impl Display for Netlist {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (_, memory) in self.memories() {
            write!(f, "&")?;
            self.write_string(f, &memory.name)?;
            write!(f, " = memory data:{} addr:{}", memory.data_width, memory.addr_width)?;
            if memory.read_only {
                write!(f, " rom")?;
            }
            if memory.asynchronous {
                write!(f, " async")?;
            }
            if !memory.init.is_empty() {
                write!(f, " {{")?;
                for (addr, value) in &memory.init {
                    write!(f, " {addr}:{value}")?;
                }
                write!(f, " }}")?;
            }
            writeln!(f)?;
        }
        for (id, signal) in self.signals() {
            let kind = match signal.role {
                Role::Input => "input",
                Role::Output => "output",
                Role::Register => "register",
                Role::Plain | Role::Const(_) => continue,
            };
            self.write_signal(f, id)?;
            writeln!(f, ":{} = {kind}", signal.width)?;
        }
        for operation in self.operations() {
            self.write_operation(f, operation)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
