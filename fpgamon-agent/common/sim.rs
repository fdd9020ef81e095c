//! In-memory register file standing in for device MMIO

use parking_lot::Mutex;
use std::collections::HashMap;

use fpgamon_raw::RegisterError;

use crate::common::mmio::RegisterDomain;
use crate::error::Result;

/// How a simulated register reacts to a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegKind {
    #[default]
    Plain,
    /// Bits written as 1 are cleared, as on latched error registers
    WriteOneToClear,
    /// Stores are dropped
    ReadOnly,
}

/// Raw register contents, handed to hooks
#[derive(Debug, Default)]
pub struct SimBank {
    values: HashMap<u64, u64>,
}

impl SimBank {
    pub fn get(&self, offset: u64) -> u64 {
        self.values.get(&offset).copied().unwrap_or(0)
    }

    pub fn set(&mut self, offset: u64, value: u64) {
        self.values.insert(offset, value);
    }
}

type WriteHook = Box<dyn FnMut(&mut SimBank, u64) + Send>;
type ReadHook = Box<dyn FnMut(&mut SimBank) + Send>;

#[derive(Default)]
struct SimState {
    bank: SimBank,
    kinds: HashMap<u64, RegKind>,
    write_hooks: HashMap<u64, WriteHook>,
    read_hooks: HashMap<u64, ReadHook>,
    reads: HashMap<u64, usize>,
    writes: Vec<(u64, u64)>,
}

/// A register window backed by memory, with per-register behavior hooks
///
/// Write hooks run after the store has been applied; read hooks run before
/// the value is returned, so they can model hardware that updates a
/// register some time after being asked to.
pub struct SimWindow {
    len: u64,
    state: Mutex<SimState>,
}

impl SimWindow {
    pub fn new(len: u64) -> Self {
        Self {
            len,
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn set_kind(&self, offset: u64, kind: RegKind) {
        self.state.lock().kinds.insert(offset, kind);
    }

    pub fn on_write<F>(&self, offset: u64, hook: F)
    where
        F: FnMut(&mut SimBank, u64) + Send + 'static,
    {
        self.state.lock().write_hooks.insert(offset, Box::new(hook));
    }

    pub fn on_read<F>(&self, offset: u64, hook: F)
    where
        F: FnMut(&mut SimBank) + Send + 'static,
    {
        self.state.lock().read_hooks.insert(offset, Box::new(hook));
    }

    /// Current value, without counting as an access or running hooks
    pub fn peek(&self, offset: u64) -> u64 {
        self.state.lock().bank.get(offset)
    }

    /// Set a value directly, bypassing register kind and hooks
    pub fn poke(&self, offset: u64, value: u64) {
        self.state.lock().bank.set(offset, value);
    }

    pub fn reads_of(&self, offset: u64) -> usize {
        self.state.lock().reads.get(&offset).copied().unwrap_or(0)
    }

    pub fn writes_to(&self, offset: u64) -> Vec<u64> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(off, _)| *off == offset)
            .map(|&(_, value)| value)
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    pub fn reset_counters(&self) {
        let mut state = self.state.lock();
        state.reads.clear();
        state.writes.clear();
    }
}

impl RegisterDomain for SimWindow {
    fn read64(&self, offset: u64) -> Result<u64> {
        RegisterError::check_access(offset, self.len)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        *state.reads.entry(offset).or_insert(0) += 1;
        if let Some(hook) = state.read_hooks.get_mut(&offset) {
            hook(&mut state.bank);
        }
        Ok(state.bank.get(offset))
    }

    fn write64(&self, offset: u64, value: u64) -> Result<()> {
        RegisterError::check_access(offset, self.len)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.writes.push((offset, value));

        match state.kinds.get(&offset).copied().unwrap_or_default() {
            RegKind::Plain => state.bank.set(offset, value),
            RegKind::WriteOneToClear => {
                let current = state.bank.get(offset);
                state.bank.set(offset, current & !value);
            }
            RegKind::ReadOnly => {}
        }

        if let Some(hook) = state.write_hooks.get_mut(&offset) {
            hook(&mut state.bank, value);
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }
}
