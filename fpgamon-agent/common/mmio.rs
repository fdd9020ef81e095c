//! Register windows: the 64-bit CSR accessor every feature talks through

use std::fs::OpenOptions;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fpgamon_raw::{Register, RegisterError, RegisterLayout};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

use crate::error::{FpgaError, Result};

/// A fixed-size window of 64-bit little-endian CSRs
///
/// Accesses are always a single aligned 64-bit load or store, never
/// partial-width.
pub trait RegisterDomain: Send + Sync {
    fn read64(&self, offset: u64) -> Result<u64>;

    fn write64(&self, offset: u64, value: u64) -> Result<()>;

    /// Window size in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Typed access on top of any [`RegisterDomain`]
pub trait CsrAccess {
    fn read_csr<T: RegisterLayout>(&self, reg: Register<T>) -> Result<T>;

    fn write_csr<T: RegisterLayout>(&self, reg: Register<T>, value: T) -> Result<()>;

    /// Read, let `f` edit the fields it cares about, write back
    fn modify_csr<T, F>(&self, reg: Register<T>, f: F) -> Result<T>
    where
        T: RegisterLayout,
        F: FnOnce(&mut T);
}

impl<D: RegisterDomain + ?Sized> CsrAccess for D {
    fn read_csr<T: RegisterLayout>(&self, reg: Register<T>) -> Result<T> {
        Ok(T::from_csr(self.read64(reg.offset)?))
    }

    fn write_csr<T: RegisterLayout>(&self, reg: Register<T>, value: T) -> Result<()> {
        self.write64(reg.offset, value.to_csr())
    }

    fn modify_csr<T, F>(&self, reg: Register<T>, f: F) -> Result<T>
    where
        T: RegisterLayout,
        F: FnOnce(&mut T),
    {
        let mut value = self.read_csr(reg)?;
        f(&mut value);
        self.write64(reg.offset, value.to_csr())?;
        Ok(value)
    }
}

/// A PCI BAR mapped into the process through its sysfs `resourceN` file
pub struct MmioRegion {
    ptr: *mut u8,
    size: usize,
    path: PathBuf,
}

impl std::fmt::Debug for MmioRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmioRegion")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("size", &self.size)
            .field("path", &self.path)
            .finish()
    }
}

// SAFETY: the mapping is owned exclusively by this value and stays valid until
// drop; every access is a bounds-checked volatile load/store.
unsafe impl Send for MmioRegion {}
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                FpgaError::MmioError(format!("Failed to open {}: {}", path.display(), e))
            })?;

        let size = usize::try_from(file.metadata()?.len())
            .map_err(|_| FpgaError::MmioError(format!("{} is too large", path.display())))?;
        let length = NonZeroUsize::new(size)
            .ok_or_else(|| FpgaError::MmioError(format!("{} is empty", path.display())))?;

        // SAFETY: fresh shared mapping of a resource file we hold open; the
        // pointer is only used within `size` bytes and unmapped in Drop.
        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                Some(&file),
                0,
            )?
        };

        tracing::info!("Mapped {} at {:p}, size={:#x}", path.display(), ptr, size);

        Ok(Self {
            ptr: ptr.cast(),
            size,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegisterDomain for MmioRegion {
    fn read64(&self, offset: u64) -> Result<u64> {
        RegisterError::check_access(offset, self.len())?;
        // SAFETY: offset is 8-byte aligned and offset + 8 <= size.
        let raw = unsafe { std::ptr::read_volatile(self.ptr.add(offset as usize).cast::<u64>()) };
        Ok(u64::from_le(raw))
    }

    fn write64(&self, offset: u64, value: u64) -> Result<()> {
        RegisterError::check_access(offset, self.len())?;
        // SAFETY: offset is 8-byte aligned and offset + 8 <= size.
        unsafe {
            std::ptr::write_volatile(self.ptr.add(offset as usize).cast::<u64>(), value.to_le());
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        self.size as u64
    }
}

impl Drop for MmioRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/size come from the successful mmap in open().
        if let Err(e) = unsafe { munmap(self.ptr.cast(), self.size) } {
            tracing::warn!("Failed to unmap {}: {}", self.path.display(), e);
        }
    }
}

/// A sub-window of a larger domain, e.g. one feature inside a BAR
pub struct RegisterWindow {
    parent: Arc<dyn RegisterDomain>,
    base: u64,
    len: u64,
    name: String,
}

impl RegisterWindow {
    pub fn new(parent: Arc<dyn RegisterDomain>, base: u64, len: u64, name: &str) -> Result<Self> {
        let end = base
            .checked_add(len)
            .filter(|&end| end <= parent.len())
            .ok_or_else(|| {
                FpgaError::invalid(format!(
                    "window {name} at {base:#x}+{len:#x} exceeds a {:#x}-byte parent",
                    parent.len()
                ))
            })?;
        tracing::debug!("Window {}: {:#x}..{:#x}", name, base, end);

        Ok(Self {
            parent,
            base,
            len,
            name: name.to_string(),
        })
    }

    pub fn base(&self) -> u64 {
        self.base
    }
}

impl RegisterDomain for RegisterWindow {
    fn read64(&self, offset: u64) -> Result<u64> {
        RegisterError::check_access(offset, self.len)?;
        let value = self.parent.read64(self.base + offset)?;
        tracing::debug!("CSR read: {} +0x{:02x} = 0x{:016x}", self.name, offset, value);
        Ok(value)
    }

    fn write64(&self, offset: u64, value: u64) -> Result<()> {
        RegisterError::check_access(offset, self.len)?;
        tracing::debug!("CSR write: {} +0x{:02x} = 0x{:016x}", self.name, offset, value);
        self.parent.write64(self.base + offset, value)
    }

    fn len(&self) -> u64 {
        self.len
    }
}
