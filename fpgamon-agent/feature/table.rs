//! Per-device feature table: slots, the device lock and open bookkeeping

use parking_lot::{Mutex, MutexGuard, RwLock};
use std::any::Any;
use std::sync::Arc;

use fpgamon_raw::{Register, RegisterLayout};

use crate::common::mmio::{CsrAccess, RegisterDomain};
use crate::error::{FpgaError, Result};
use crate::feature::lifecycle::FeatureDriver;
use crate::feature::namespace::Namespace;

/// One discovered feature: its name and register window
pub struct FeatureSlot {
    pub name: String,
    window: Arc<dyn RegisterDomain>,
}

/// State serialized by the device lock
#[derive(Default)]
pub struct DeviceState {
    open_count: u32,
    excl_open: bool,
    private: Option<Box<dyn Any + Send>>,
}

/// Ordered, fixed-size collection of the features of one device
///
/// Every register-mutating operation on any feature goes through
/// [`FeatureTable::lock`]; there is no finer-grained locking.
pub struct FeatureTable {
    name: String,
    slots: Vec<Option<FeatureSlot>>,
    pub(crate) bindings: RwLock<Vec<Option<Arc<dyn FeatureDriver>>>>,
    state: Mutex<DeviceState>,
    namespace: Namespace,
    quiesce_slot: Option<usize>,
}

impl FeatureTable {
    /// Allocate a table with exactly `table_size` empty slots
    pub fn attach(name: &str, table_size: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(table_size).map_err(|e| {
            FpgaError::OutOfMemory(format!("{table_size} feature slots for {name}: {e}"))
        })?;
        slots.resize_with(table_size, || None);

        let mut bindings = Vec::new();
        bindings.try_reserve_exact(table_size).map_err(|e| {
            FpgaError::OutOfMemory(format!("{table_size} driver bindings for {name}: {e}"))
        })?;
        bindings.resize_with(table_size, || None);

        tracing::debug!("Attached feature table {} with {} slots", name, table_size);

        Ok(Self {
            name: name.to_string(),
            slots,
            bindings: RwLock::new(bindings),
            state: Mutex::new(DeviceState::default()),
            namespace: Namespace::new(),
            quiesce_slot: None,
        })
    }

    /// Fill slot `index` with a discovered feature
    pub fn add_feature(
        &mut self,
        index: usize,
        name: &str,
        window: Arc<dyn RegisterDomain>,
    ) -> Result<()> {
        let size = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            FpgaError::invalid(format!("feature index {index} beyond {size} slots"))
        })?;
        if let Some(existing) = slot {
            return Err(FpgaError::AlreadyExists(format!(
                "slot {index} already holds {}",
                existing.name
            )));
        }

        tracing::debug!("Feature {} at slot {} ({:#x} bytes)", name, index, window.len());
        *slot = Some(FeatureSlot {
            name: name.to_string(),
            window,
        });
        Ok(())
    }

    /// Designate the feature whose `quiesce` hook runs when the last handle closes
    pub fn set_quiesce_feature(&mut self, index: usize) {
        self.quiesce_slot = Some(index);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&FeatureSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = (usize, &FeatureSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (index, s)))
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub(crate) fn driver(&self, index: usize) -> Option<Arc<dyn FeatureDriver>> {
        self.bindings.read().get(index).cloned().flatten()
    }

    /// Take the device lock
    pub fn lock(&self) -> DeviceGuard<'_> {
        DeviceGuard {
            table: self,
            state: self.state.lock(),
        }
    }

    /// Read one typed register of feature `index` under the device lock
    pub fn read_csr<T: RegisterLayout>(&self, index: usize, reg: Register<T>) -> Result<T> {
        self.lock().window(index)?.read_csr(reg)
    }

    /// Register a new open handle
    ///
    /// An exclusive open needs the device to be closed and then blocks every
    /// further open until it is released.
    pub fn open(&self, exclusive: bool) -> Result<()> {
        let mut state = self.state.lock();
        if exclusive && state.open_count > 0 {
            return Err(FpgaError::busy(format!(
                "{} already opened {} times",
                self.name, state.open_count
            )));
        }
        if state.excl_open {
            return Err(FpgaError::busy(format!("{} is opened exclusively", self.name)));
        }

        state.excl_open = exclusive;
        state.open_count += 1;
        tracing::debug!("{} opened {} times", self.name, state.open_count);
        Ok(())
    }

    /// Drop an open handle; the last one quiesces the designated feature
    pub fn release(&self) -> Result<()> {
        let mut guard = self.lock();
        if guard.state.open_count == 0 {
            return Err(FpgaError::InvalidState(format!("{} is not open", self.name)));
        }
        guard.state.open_count -= 1;
        guard.state.excl_open = false;

        if guard.state.open_count == 0 {
            if let Some(index) = self.quiesce_slot {
                if let Some(driver) = self.driver(index) {
                    tracing::debug!("Last handle of {} closed, quiescing {}", self.name, driver.name());
                    driver.quiesce(&mut guard, index)?;
                }
            }
        }
        Ok(())
    }

    /// Run a readable attribute
    pub fn show(&self, path: &str) -> Result<String> {
        let attr = self.namespace.attribute(path)?;
        attr.show(self)
    }

    /// Run a writable attribute
    pub fn store(&self, path: &str, value: &str) -> Result<()> {
        let attr = self.namespace.attribute(path)?;
        attr.store(self, value)
    }
}

/// Proof that the device lock is held
pub struct DeviceGuard<'a> {
    table: &'a FeatureTable,
    state: MutexGuard<'a, DeviceState>,
}

impl<'a> DeviceGuard<'a> {
    pub fn table(&self) -> &'a FeatureTable {
        self.table
    }

    /// Register window of the feature at `index`
    pub fn window(&self, index: usize) -> Result<&'a dyn RegisterDomain> {
        self.table
            .slot(index)
            .map(|slot| slot.window.as_ref())
            .ok_or_else(|| FpgaError::NoDevice(format!("no feature at slot {index}")))
    }

    pub fn open_count(&self) -> u32 {
        self.state.open_count
    }

    pub fn is_exclusive(&self) -> bool {
        self.state.excl_open
    }

    /// Install the device private payload; it can be set only once
    pub fn set_private<T: Any + Send>(&mut self, value: T) -> Result<()> {
        if self.state.private.is_some() {
            return Err(FpgaError::AlreadyExists(format!(
                "{} private data already set",
                self.table.name
            )));
        }
        self.state.private = Some(Box::new(value));
        Ok(())
    }

    /// Remove the private payload before detach
    pub fn take_private<T: Any + Send>(&mut self) -> Result<T> {
        let boxed = self.state.private.take().ok_or_else(|| {
            FpgaError::InvalidState(format!("{} has no private data", self.table.name))
        })?;
        match boxed.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(other) => {
                self.state.private = Some(other);
                Err(FpgaError::InvalidState("private data has another type".into()))
            }
        }
    }

    pub fn private<T: Any>(&self) -> Result<&T> {
        self.state
            .private
            .as_ref()
            .and_then(|p| p.downcast_ref::<T>())
            .ok_or_else(|| FpgaError::InvalidState(format!("{} has no private data", self.table.name)))
    }

    pub fn private_mut<T: Any>(&mut self) -> Result<&mut T> {
        let name = &self.table.name;
        self.state
            .private
            .as_mut()
            .and_then(|p| p.downcast_mut::<T>())
            .ok_or_else(|| FpgaError::InvalidState(format!("{name} has no private data")))
    }
}
