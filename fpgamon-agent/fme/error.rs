//! Global error feature: latched error classes, compare-and-clear, injection
//! and interrupt routing

use fpgamon_raw::fme::error::{self as regs, ErrorSnapshot, FME_FIRST_ERROR_MASK, FME_NEXT_ERROR_MASK};

use crate::common::mmio::{CsrAccess, RegisterDomain};
use crate::common::text::{parse_u64, parse_u8, show_dec, show_hex};
use crate::error::{FpgaError, Result};
use crate::feature::{AttrGroup, Attribute, DeviceGuard, FeatureDriver, FeatureTable, ObjectRegistry};
use crate::fme::ioctl::{self, IrqSet, IRQ_UNBIND};
use crate::fme::Fme;

pub const ERRORS_OBJECT: &str = "errors";

/// One clearable error class: its value/mask register pair and clear policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClass {
    pub name: &'static str,
    pub value: u64,
    pub mask: u64,
    /// Bits software may clear; also written to the mask during the clear
    pub clear_bits: u64,
    /// Mask value restored when the sequence ends
    pub restore: u64,
    /// Also snapshot and clear the first/next error registers
    pub snapshots: bool,
}

pub const FME_ERRORS: ErrorClass = ErrorClass {
    name: "fme",
    value: regs::FME_ERR.offset,
    mask: regs::FME_ERR_MASK.offset,
    clear_bits: regs::FME_ERROR0_MASK,
    restore: regs::FME_ERROR0_MASK_DEFAULT,
    snapshots: true,
};

pub const PCIE0_ERRORS: ErrorClass = ErrorClass {
    name: "pcie0",
    value: regs::PCIE0_ERR.offset,
    mask: regs::PCIE0_ERR_MASK.offset,
    clear_bits: regs::FME_PCIE0_ERROR_MASK,
    restore: 0,
    snapshots: false,
};

pub const PCIE1_ERRORS: ErrorClass = ErrorClass {
    name: "pcie1",
    value: regs::PCIE1_ERR.offset,
    mask: regs::PCIE1_ERR_MASK.offset,
    clear_bits: regs::FME_PCIE1_ERROR_MASK,
    restore: 0,
    snapshots: false,
};

pub const WARNING_ERRORS: ErrorClass = ErrorClass {
    name: "warning",
    value: regs::RAS_WERR.offset,
    mask: regs::RAS_WERR_MASK.offset,
    clear_bits: regs::FME_RAS_WERROR_MASK,
    restore: 0,
    snapshots: false,
};

/// Clear `class` only if its register still holds `expected`
///
/// The class mask is opened for the duration and restored whatever the
/// outcome. A stale `expected` leaves the value register untouched and
/// reports [`FpgaError::Busy`].
pub fn clear(guard: &DeviceGuard<'_>, index: usize, class: &ErrorClass, expected: u64) -> Result<()> {
    let window = guard.window(index)?;
    window.write64(class.mask, class.clear_bits)?;
    let outcome = compare_and_clear(window, class, expected);
    if let Err(e) = window.write64(class.mask, class.restore) {
        tracing::error!("Failed to restore {} error mask: {}", class.name, e);
        outcome?;
        return Err(e);
    }
    outcome
}

fn compare_and_clear(window: &dyn RegisterDomain, class: &ErrorClass, expected: u64) -> Result<()> {
    let current = window.read64(class.value)?;
    if current != expected {
        tracing::warn!(
            "Refusing to clear {} errors: expected 0x{:x}, register holds 0x{:x}",
            class.name,
            expected,
            current
        );
        return Err(FpgaError::busy(format!(
            "{} errors changed to 0x{current:x}",
            class.name
        )));
    }

    if class.snapshots {
        let first = window.read_csr(regs::FME_FIRST_ERR)?;
        let next = window.read_csr(regs::FME_NEXT_ERR)?;
        window.write64(class.value, current & class.clear_bits)?;
        window.write_csr(regs::FME_FIRST_ERR, ErrorSnapshot(first.0 & FME_FIRST_ERROR_MASK))?;
        window.write_csr(regs::FME_NEXT_ERR, ErrorSnapshot(next.0 & FME_NEXT_ERROR_MASK))?;
    } else {
        window.write64(class.value, current & class.clear_bits)?;
    }

    tracing::info!("Cleared {} errors 0x{:x}", class.name, current);
    Ok(())
}

fn store_clear(table: &FeatureTable, index: usize, class: &'static ErrorClass, input: &str) -> Result<()> {
    let expected = parse_u64(input)?;
    let guard = table.lock();
    clear(&guard, index, class, expected)
}

fn store_inject(table: &FeatureTable, index: usize, input: &str) -> Result<()> {
    let guard = table.lock();
    let window = guard.window(index)?;
    let mut inj = window.read_csr(regs::RAS_ERROR_INJ)?;
    let data = u64::from(parse_u8(input)?);
    if data > regs::FME_RAS_ERROR_INJ_MASK {
        return Err(FpgaError::invalid(format!("injection mask 0x{data:x} above 0x7")));
    }
    inj.0 = data;
    window.write_csr(regs::RAS_ERROR_INJ, inj)
}

fn class_attr(index: usize, name: &'static str, class: &'static ErrorClass) -> Attribute {
    let value = class.value;
    Attribute::rw(
        name,
        move |t| Ok(show_hex(t.read_csr(index, fpgamon_raw::Register::<u64>::new(value))?)),
        move |t, v| store_clear(t, index, class, v),
    )
}

fn hex_attr(index: usize, name: &'static str, reg: fpgamon_raw::Register<u64>) -> Attribute {
    Attribute::ro(name, move |t| Ok(show_hex(t.read_csr(index, reg)?)))
}

fn groups(index: usize) -> Vec<AttrGroup> {
    vec![
        AttrGroup::named(
            "fme-errors",
            vec![
                hex_attr(index, "errors", regs::FME_ERR),
                Attribute::ro("first_error", move |t| {
                    Ok(show_hex(t.read_csr(index, regs::FME_FIRST_ERR)?.err_reg_status()))
                }),
                Attribute::ro("next_error", move |t| {
                    Ok(show_hex(t.read_csr(index, regs::FME_NEXT_ERR)?.err_reg_status()))
                }),
                Attribute::wo("clear", move |t, v| store_clear(t, index, &FME_ERRORS, v)),
            ],
        ),
        AttrGroup::new(vec![
            Attribute::ro("revision", move |t| {
                Ok(show_dec(t.read_csr(index, regs::HEADER)?.revision()))
            }),
            class_attr(index, "pcie0_errors", &PCIE0_ERRORS),
            class_attr(index, "pcie1_errors", &PCIE1_ERRORS),
            hex_attr(index, "gbs_errors", regs::RAS_GERR),
            hex_attr(index, "bbs_errors", regs::RAS_BERR),
            Attribute::rw(
                "warning_errors",
                move |t| Ok(show_hex(t.read_csr(index, regs::RAS_WERR)?.event_warn_err())),
                move |t, v| store_clear(t, index, &WARNING_ERRORS, v),
            ),
            Attribute::rw(
                "inject_error",
                move |t| {
                    let inj = t.read_csr(index, regs::RAS_ERROR_INJ)?;
                    Ok(show_hex(inj.0 & regs::FME_RAS_ERROR_INJ_MASK))
                },
                move |t, v| store_inject(t, index, v),
            ),
        ]),
    ]
}

pub struct ErrorDriver;

impl ErrorDriver {
    fn irq_count(guard: &DeviceGuard<'_>) -> Result<u32> {
        Ok(guard.private::<Fme>()?.err_irqs.len() as u32)
    }

    fn set_irq(table: &FeatureTable, arg: &[u8]) -> Result<i64> {
        let req = IrqSet::decode(arg)?;
        let mut guard = table.lock();
        let fme = guard.private_mut::<Fme>()?;
        let total = fme.err_irqs.len();
        if total == 0 {
            return Err(FpgaError::NoEntry("error feature has no interrupts".into()));
        }

        let start = req.start as usize;
        let end = start
            .checked_add(req.vectors.len())
            .filter(|&end| start < total && end <= total)
            .ok_or_else(|| {
                FpgaError::invalid(format!(
                    "irq range {}+{} beyond {} interrupts",
                    req.start,
                    req.vectors.len(),
                    total
                ))
            })?;

        for (slot, &vector) in fme.err_irqs[start..end].iter_mut().zip(&req.vectors) {
            *slot = (vector > IRQ_UNBIND).then_some(vector);
        }
        tracing::debug!("Error interrupts {}..{} routed to {:?}", start, end, req.vectors);
        Ok(0)
    }
}

impl FeatureDriver for ErrorDriver {
    fn name(&self) -> &'static str {
        "fme_error"
    }

    fn init(&self, table: &FeatureTable, index: usize) -> Result<()> {
        let irqs = {
            let mut guard = table.lock();
            let window = guard.window(index)?;
            for (mask, value) in regs::DEFAULT_MASKS {
                window.write64(mask, value)?;
            }
            let cap = window.read_csr(regs::ERROR_CAP)?;
            let irqs = if cap.supp_int() == 1 { cap.int_vect() as usize } else { 0 };
            guard.private_mut::<Fme>()?.err_irqs = vec![None; irqs];
            irqs
        };

        if let Err(e) = table.namespace().create_object(ERRORS_OBJECT, groups(index)) {
            table.lock().private_mut::<Fme>()?.err_irqs.clear();
            return Err(e);
        }
        tracing::debug!("Error feature up with {} interrupts", irqs);
        Ok(())
    }

    fn uninit(&self, table: &FeatureTable, _index: usize) {
        table.namespace().remove_object(ERRORS_OBJECT);
        if let Ok(fme) = table.lock().private_mut::<Fme>() {
            fme.err_irqs.clear();
        }
    }

    fn ioctl(&self, table: &FeatureTable, _index: usize, cmd: u32, arg: &mut [u8]) -> Result<i64> {
        match cmd {
            ioctl::FPGA_FME_ERR_GET_IRQ_NUM => {
                let count = Self::irq_count(&table.lock())?;
                ioctl::put_u32(arg, count)?;
                Ok(0)
            }
            ioctl::FPGA_FME_ERR_SET_IRQ => Self::set_irq(table, arg),
            _ => Err(FpgaError::NotMine),
        }
    }

    fn quiesce(&self, guard: &mut DeviceGuard<'_>, _index: usize) -> Result<()> {
        let fme = guard.private_mut::<Fme>()?;
        let bound = fme.err_irqs.iter().filter(|v| v.is_some()).count();
        fme.err_irqs.iter_mut().for_each(|v| *v = None);
        if bound > 0 {
            tracing::info!("Unbound {} error interrupts on last close", bound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::sim::{RegKind, SimWindow};
    use std::sync::Arc;

    fn window() -> Arc<SimWindow> {
        let win = Arc::new(SimWindow::new(0x88));
        for class in [FME_ERRORS, PCIE0_ERRORS, PCIE1_ERRORS, WARNING_ERRORS] {
            win.set_kind(class.value, RegKind::WriteOneToClear);
        }
        win
    }

    fn table(win: Arc<SimWindow>) -> FeatureTable {
        let mut table = FeatureTable::attach("fme", 1).unwrap();
        table.add_feature(0, "fme_error", win).unwrap();
        table.lock().set_private(Fme::default()).unwrap();
        let drivers: Vec<Arc<dyn FeatureDriver>> = vec![Arc::new(ErrorDriver)];
        table.init_all(&drivers).unwrap();
        table
    }

    #[test]
    fn test_init_programs_default_masks() {
        let win = window();
        win.poke(regs::PCIE0_ERR_MASK.offset, 0xFF);
        let _table = table(win.clone());
        assert_eq!(win.peek(regs::FME_ERR_MASK.offset), 0x40);
        assert_eq!(win.peek(regs::PCIE0_ERR_MASK.offset), 0);
    }

    #[test]
    fn test_clear_matching_snapshot() {
        let win = window();
        let table = table(win.clone());
        win.poke(regs::PCIE0_ERR.offset, 0x1_0005);
        win.reset_counters();

        table.store("errors/pcie0_errors", "0x10005").unwrap();
        // only the class bits are clearable
        assert_eq!(win.peek(regs::PCIE0_ERR.offset), 0x1_0000);
        assert_eq!(win.writes_to(regs::PCIE0_ERR_MASK.offset), vec![0xFF, 0]);
    }

    #[test]
    fn test_clear_stale_snapshot() {
        let win = window();
        let table = table(win.clone());
        win.poke(regs::PCIE1_ERR.offset, 0x3);
        win.reset_counters();

        assert!(matches!(
            table.store("errors/pcie1_errors", "0x1"),
            Err(FpgaError::Busy(_))
        ));
        assert_eq!(win.peek(regs::PCIE1_ERR.offset), 0x3);
        assert!(win.writes_to(regs::PCIE1_ERR.offset).is_empty());
        assert_eq!(win.writes_to(regs::PCIE1_ERR_MASK.offset), vec![0xFF, 0]);
    }

    #[test]
    fn test_fme_clear_resets_snapshots() {
        let win = window();
        let table = table(win.clone());
        win.poke(regs::FME_ERR.offset, 0x41);
        win.poke(regs::FME_FIRST_ERR.offset, (0x2 << 60) | 0x41);
        win.poke(regs::FME_NEXT_ERR.offset, (0x1 << 60) | 0x1);

        assert!(table.store("errors/fme-errors/clear", "65").is_ok());
        assert_eq!(win.peek(regs::FME_ERR.offset), 0);
        assert_eq!(win.peek(regs::FME_FIRST_ERR.offset), 0x41);
        assert_eq!(win.peek(regs::FME_NEXT_ERR.offset), 0x1);
        assert_eq!(win.peek(regs::FME_ERR_MASK.offset), 0x40);
        assert_eq!(table.show("errors/fme-errors/first_error").unwrap(), "0x41\n");
    }

    #[test]
    fn test_clear_rejects_garbage() {
        let win = window();
        let table = table(win.clone());
        win.reset_counters();
        assert!(matches!(
            table.store("errors/warning_errors", "zz"),
            Err(FpgaError::InvalidArgument(_))
        ));
        assert_eq!(win.write_count(), 0);
    }

    #[test]
    fn test_inject_error() {
        let win = window();
        let table = table(win.clone());
        table.store("errors/inject_error", "5").unwrap();
        assert_eq!(table.show("errors/inject_error").unwrap(), "0x5\n");
        assert!(matches!(
            table.store("errors/inject_error", "8"),
            Err(FpgaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_irq_routing_and_quiesce() {
        let win = window();
        win.poke(regs::ERROR_CAP.offset, (4 << 1) | 1);
        let mut table = table(win);
        table.set_quiesce_feature(0);

        let mut num = [0u8; 4];
        table.dispatch(ioctl::FPGA_FME_ERR_GET_IRQ_NUM, &mut num).unwrap();
        assert_eq!(u32::from_le_bytes(num), 4);

        table.open(false).unwrap();
        let mut set = IrqSet { start: 1, vectors: vec![10, 11] }.encode();
        table.dispatch(ioctl::FPGA_FME_ERR_SET_IRQ, &mut set).unwrap();
        assert_eq!(
            table.lock().private::<Fme>().unwrap().err_irqs,
            vec![None, Some(10), Some(11), None]
        );

        let mut unbind = IrqSet { start: 2, vectors: vec![IRQ_UNBIND] }.encode();
        table.dispatch(ioctl::FPGA_FME_ERR_SET_IRQ, &mut unbind).unwrap();
        assert_eq!(
            table.lock().private::<Fme>().unwrap().err_irqs,
            vec![None, Some(10), None, None]
        );

        let mut bad = IrqSet { start: 3, vectors: vec![1, 2] }.encode();
        assert!(matches!(
            table.dispatch(ioctl::FPGA_FME_ERR_SET_IRQ, &mut bad),
            Err(FpgaError::InvalidArgument(_))
        ));

        table.release().unwrap();
        assert!(table
            .lock()
            .private::<Fme>()
            .unwrap()
            .err_irqs
            .iter()
            .all(Option::is_none));
    }

    /// Drops the store that puts a class mask back to its resting value
    struct StuckMask {
        inner: Arc<SimWindow>,
        mask: u64,
    }

    impl RegisterDomain for StuckMask {
        fn read64(&self, offset: u64) -> Result<u64> {
            self.inner.read64(offset)
        }

        fn write64(&self, offset: u64, value: u64) -> Result<()> {
            if offset == self.mask && value == 0 {
                return Err(FpgaError::MmioError("mask store lost".into()));
            }
            self.inner.write64(offset, value)
        }

        fn len(&self) -> u64 {
            self.inner.len()
        }
    }

    fn stuck_table(win: Arc<SimWindow>) -> FeatureTable {
        let stuck = StuckMask {
            inner: win,
            mask: regs::PCIE1_ERR_MASK.offset,
        };
        let mut table = FeatureTable::attach("fme", 1).unwrap();
        table.add_feature(0, "fme_error", Arc::new(stuck)).unwrap();
        table
    }

    #[test]
    fn test_failed_mask_restore_keeps_mismatch() {
        let win = window();
        win.poke(regs::PCIE1_ERR.offset, 0x3);
        let table = stuck_table(win.clone());

        let guard = table.lock();
        assert!(matches!(
            clear(&guard, 0, &PCIE1_ERRORS, 0x1),
            Err(FpgaError::Busy(_))
        ));
        assert_eq!(win.peek(regs::PCIE1_ERR.offset), 0x3);

        assert!(matches!(
            clear(&guard, 0, &PCIE1_ERRORS, 0x3),
            Err(FpgaError::MmioError(_))
        ));
        assert_eq!(win.peek(regs::PCIE1_ERR.offset), 0);
    }

    #[test]
    fn test_set_irq_without_capability() {
        let table = table(window());
        let mut set = IrqSet { start: 0, vectors: vec![1] }.encode();
        assert!(matches!(
            table.dispatch(ioctl::FPGA_FME_ERR_SET_IRQ, &mut set),
            Err(FpgaError::NoEntry(_))
        ));
    }
}
