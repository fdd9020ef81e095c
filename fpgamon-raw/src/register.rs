//! Generic register abstractions for type-safe CSR programming

use std::marker::PhantomData;

/// Trait for register layouts that can be converted to/from raw CSR values
///
/// Every FME register is a single 64-bit word. Layouts keep the raw word
/// around so that a read-modify-write only touches the fields it names and
/// leaves reserved bits exactly as the hardware returned them.
///
/// # Example
///
/// ```
/// use fpgamon_raw::register::RegisterLayout;
///
/// #[derive(Debug, Default)]
/// struct MyControl(u64);
///
/// impl RegisterLayout for MyControl {
///     fn to_csr(&self) -> u64 {
///         self.0
///     }
///
///     fn from_csr(value: u64) -> Self {
///         Self(value)
///     }
/// }
///
/// assert_eq!(MyControl::from_csr(0x42).to_csr(), 0x42);
/// ```
pub trait RegisterLayout: Sized {
    /// Convert this register layout to a raw CSR value
    fn to_csr(&self) -> u64;

    /// Parse a raw CSR value into this register layout
    fn from_csr(value: u64) -> Self;
}

impl RegisterLayout for u64 {
    fn to_csr(&self) -> u64 {
        *self
    }

    fn from_csr(value: u64) -> Self {
        value
    }
}

/// A register at a fixed byte offset inside a feature window, with a typed layout
///
/// ```
/// use fpgamon_raw::fme::gperf::{CacheCtl, CACHE_CTL};
///
/// assert_eq!(CACHE_CTL.offset, 0x08);
/// let _: fpgamon_raw::Register<CacheCtl> = CACHE_CTL;
/// ```
#[derive(Debug)]
pub struct Register<T: RegisterLayout> {
    /// Byte offset from the start of the feature window
    pub offset: u64,
    _layout: PhantomData<fn() -> T>,
}

impl<T: RegisterLayout> Clone for Register<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: RegisterLayout> Copy for Register<T> {}

impl<T: RegisterLayout> Register<T> {
    pub const fn new(offset: u64) -> Self {
        Self {
            offset,
            _layout: PhantomData,
        }
    }

    /// The same register inside a window that starts `base` bytes further in
    pub const fn at(self, base: u64) -> Self {
        Self::new(base + self.offset)
    }
}

/// Mask covering the low `width` bits
pub const fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Extract `width` bits starting at bit `lo`
pub const fn field(csr: u64, lo: u32, width: u32) -> u64 {
    (csr >> lo) & mask(width)
}

/// Replace `width` bits starting at bit `lo`, keeping every other bit
///
/// Bits of `value` beyond `width` are discarded.
pub const fn set_field(csr: u64, lo: u32, width: u32, value: u64) -> u64 {
    let m = mask(width) << lo;
    (csr & !m) | ((value << lo) & m)
}

/// Declare a CSR newtype with a getter/setter pair per bit field
///
/// Setters only rewrite their own field, so a value read from hardware can be
/// modified and written back without disturbing reserved bits.
///
/// ```
/// use fpgamon_raw::csr;
///
/// csr! {
///     /// Example control word
///     pub struct Demo {
///         enable, set_enable: 0, 1;
///         code, set_code: 4, 4;
///     }
/// }
///
/// let mut d = Demo(0xFF00);
/// d.set_code(0x3);
/// assert_eq!(d.code(), 0x3);
/// assert_eq!(d.0, 0xFF30);
/// ```
#[macro_export]
macro_rules! csr {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($get:ident, $set:ident: $lo:expr, $width:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        $vis struct $name(pub u64);

        impl $name {
            $(
                pub const fn $get(&self) -> u64 {
                    $crate::register::field(self.0, $lo, $width)
                }

                pub fn $set(&mut self, value: u64) {
                    self.0 = $crate::register::set_field(self.0, $lo, $width, value);
                }
            )*
        }

        impl $crate::register::RegisterLayout for $name {
            fn to_csr(&self) -> u64 {
                self.0
            }

            fn from_csr(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_extraction() {
        assert_eq!(field(0xABCD, 4, 8), 0xBC);
        assert_eq!(field(u64::MAX, 0, 64), u64::MAX);
        assert_eq!(field(1 << 63, 63, 1), 1);
    }

    #[test]
    fn test_set_field_preserves_other_bits() {
        let csr = 0xFFFF_0000_0000_00FF;
        let updated = set_field(csr, 8, 8, 0x5A);
        assert_eq!(updated, 0xFFFF_0000_0000_5AFF);
        // overwide value is truncated to the field
        assert_eq!(set_field(0, 0, 4, 0x1F), 0xF);
    }
}
