//! Feature driver contract, ordered init/uninit and request dispatch

use std::sync::Arc;

use crate::error::{FpgaError, Result};
use crate::feature::table::{DeviceGuard, FeatureTable};

/// Behavior bound to one feature slot
///
/// Every hook is optional. A driver that does not service a control request
/// returns [`FpgaError::NotMine`] so the next feature gets a chance.
pub trait FeatureDriver: Send + Sync {
    /// Name of the feature this driver binds to
    fn name(&self) -> &'static str;

    /// Build the feature's state and register its attributes
    ///
    /// The driver is bound to its slot only after `init` returns `Ok`, so
    /// while it runs the slot has no driver: dispatch skips it and quiesce
    /// does not reach it.
    fn init(&self, _table: &FeatureTable, _index: usize) -> Result<()> {
        Ok(())
    }

    fn uninit(&self, _table: &FeatureTable, _index: usize) {}

    fn ioctl(&self, _table: &FeatureTable, _index: usize, _cmd: u32, _arg: &mut [u8]) -> Result<i64> {
        Err(FpgaError::NotMine)
    }

    /// Reset per-open context; called under the device lock when the last handle closes
    fn quiesce(&self, _guard: &mut DeviceGuard<'_>, _index: usize) -> Result<()> {
        Ok(())
    }
}

impl FeatureTable {
    /// Bind drivers to slots by name and run their `init` in slot order
    ///
    /// On failure every feature already initialized is torn down in reverse
    /// order and all bindings are dropped before the error is returned.
    pub fn init_all(&self, drivers: &[Arc<dyn FeatureDriver>]) -> Result<()> {
        let mut initialized: Vec<usize> = Vec::new();

        for (index, slot) in self.slots() {
            let Some(driver) = drivers.iter().find(|d| d.name() == slot.name) else {
                tracing::debug!("No driver for feature {}, left unbound", slot.name);
                continue;
            };

            if let Err(e) = driver.init(self, index) {
                tracing::error!("Failed to initialize feature {}: {}", slot.name, e);
                for &prev in initialized.iter().rev() {
                    if let Some(done) = self.unbind(prev) {
                        done.uninit(self, prev);
                    }
                }
                return Err(e);
            }

            tracing::info!("Feature {} initialized at slot {}", slot.name, index);
            self.bindings.write()[index] = Some(Arc::clone(driver));
            initialized.push(index);
        }

        Ok(())
    }

    /// Tear every bound feature down, in reverse slot order
    pub fn uninit_all(&self) {
        for index in (0..self.len()).rev() {
            if let Some(driver) = self.unbind(index) {
                driver.uninit(self, index);
                tracing::info!("Feature {} uninitialized", driver.name());
            }
        }
    }

    fn unbind(&self, index: usize) -> Option<Arc<dyn FeatureDriver>> {
        self.bindings.write().get_mut(index).and_then(Option::take)
    }

    /// Offer a control request to each bound feature in slot order
    pub fn dispatch(&self, cmd: u32, arg: &mut [u8]) -> Result<i64> {
        let bound: Vec<(usize, Arc<dyn FeatureDriver>)> = self
            .bindings
            .read()
            .iter()
            .enumerate()
            .filter_map(|(index, d)| d.clone().map(|d| (index, d)))
            .collect();

        for (index, driver) in bound {
            match driver.ioctl(self, index, cmd, arg) {
                Err(FpgaError::NotMine) => continue,
                result => return result,
            }
        }

        Err(FpgaError::Unsupported(format!(
            "{}: ioctl 0x{:x} not handled by any feature",
            self.name(),
            cmd
        )))
    }
}
