//! Descriptors of the resources instantiated by interconnect synthesis.
use crate::{Expr, Process, SignalRef, Statement, StdLogicVector, Type, Value};
use xil_utils::{Id, bits_needed_for};

/// A clocked register, split into the value it holds and the value it will
/// hold after the next clock edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Register {
    pub index: usize,
    pub ty: Type,
    pub cur: SignalRef,
    pub next: SignalRef,
}

impl Register {
    pub fn new(index: usize, ty: Type) -> Self {
        Self {
            index,
            ty,
            cur: SignalRef::signal(format!("R{index}_cur"), ty),
            next: SignalRef::signal(format!("R{index}_next"), ty),
        }
    }
}

/// A simple dual-port RAM with one read and one write port. Reads are
/// registered: the word addressed at step `t` appears on `dout` at `t + 1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Memory {
    pub index: usize,
    pub ty: Type,
    pub words: usize,
    pub addr_width: u32,
    pub instance: Id,
    pub component: Id,
    pub addr_r: SignalRef,
    pub addr_w: SignalRef,
    pub din: SignalRef,
    pub dout: SignalRef,
    pub wr_en: SignalRef,
}

impl Memory {
    pub fn new(index: usize, ty: Type, words: usize) -> Self {
        let addr_width = bits_needed_for(words as u64) as u32;
        let instance = format!("Mem{index}");
        let port = |name: &str, ty: Type| SignalRef::signal(format!("{instance}_{name}"), ty);
        Self {
            index,
            ty,
            words,
            addr_width,
            addr_r: port("AddrR", Type::Vector(addr_width)),
            addr_w: port("AddrW", Type::Vector(addr_width)),
            din: port("DIn", ty),
            dout: port("DOut", ty),
            wr_en: port("WrEn", Type::Logic),
            instance: Id::new(&instance),
            component: Id::new("SimpleDPRAM"),
        }
    }

    /// The address of `word` on either address port.
    pub fn address(&self, word: usize) -> Value {
        Value::Vector(StdLogicVector::from_uint(word as u64, self.addr_width))
    }
}

/// A process triggered by the rising edge of `clock`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncProcess {
    pub clock: Id,
    pub process: Process,
}

impl SyncProcess {
    /// The process that copies every register's next value into its current
    /// value.
    pub fn register_update(registers: &[Register]) -> Self {
        let body = registers
            .iter()
            .map(|r| Statement::Store {
                target: r.cur,
                value: Expr::Signal(r.next),
            })
            .collect();
        Self {
            clock: Id::new("Clk"),
            process: Process::new("SyncFSM", body),
        }
    }
}

/// Resource counts of a synthesized interconnect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct InterconnectStats {
    pub temporaries: usize,
    pub dead_temporaries: usize,
    pub registers: usize,
    pub memories: usize,
    pub memory_words: usize,
}

/// The resources and control logic produced next to a detailed flow matrix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Interconnect {
    pub registers: Vec<Register>,
    pub memories: Vec<Memory>,
    pub processes: Vec<SyncProcess>,
    pub stats: InterconnectStats,
}

impl Interconnect {
    pub fn stats(&self) -> &InterconnectStats {
        &self.stats
    }

    /// Every signal that the resources declare.
    pub fn signals(&self) -> impl Iterator<Item = SignalRef> + '_ {
        self.registers
            .iter()
            .flat_map(|r| [r.cur, r.next])
            .chain(
                self.memories
                    .iter()
                    .flat_map(|m| [m.addr_r, m.addr_w, m.din, m.dout, m.wr_en]),
            )
    }
}
