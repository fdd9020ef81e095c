//! Control request codes and their fixed-layout argument blocks
//!
//! Blocks are little-endian u32 words. Every block except the IRQ ones
//! starts with `argsz`, the size the caller claims to have filled in.

use crate::error::{FpgaError, Result};

pub const FPGA_MAGIC: u32 = 0xB6;

/// `_IO(FPGA_MAGIC, nr)`
pub const fn io(nr: u32) -> u32 {
    (FPGA_MAGIC << 8) | nr
}

pub const FPGA_GET_API_VERSION: u32 = io(0);
pub const FPGA_CHECK_EXTENSION: u32 = io(1);
pub const FPGA_FME_GET_INFO: u32 = io(0x80);
pub const FPGA_FME_PORT_PR: u32 = io(0x81);
pub const FPGA_FME_PORT_RELEASE: u32 = io(0x82);
pub const FPGA_FME_PORT_ASSIGN: u32 = io(0x83);
pub const FPGA_FME_ERR_GET_IRQ_NUM: u32 = io(0x84);
pub const FPGA_FME_ERR_SET_IRQ: u32 = io(0x85);

pub const FPGA_API_VERSION: i64 = 0;

/// Vector value that unbinds an interrupt; any negative vector does the same
pub const IRQ_UNBIND: i32 = -1;

fn word(arg: &[u8], index: usize) -> Result<u32> {
    let start = index * 4;
    arg.get(start..start + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| FpgaError::invalid(format!("argument block shorter than {} bytes", start + 4)))
}

fn put_word(arg: &mut [u8], index: usize, value: u32) -> Result<()> {
    let start = index * 4;
    let len = arg.len();
    let dst = arg
        .get_mut(start..start + 4)
        .ok_or_else(|| FpgaError::invalid(format!("argument block of {len} bytes too short")))?;
    dst.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Validate the `argsz` word against the smallest layout we understand
fn check_argsz(arg: &[u8], minsz: usize) -> Result<()> {
    let argsz = word(arg, 0)? as usize;
    if argsz < minsz || arg.len() < minsz {
        return Err(FpgaError::invalid(format!(
            "argsz {argsz} below minimum {minsz}"
        )));
    }
    Ok(())
}

/// `FPGA_FME_GET_INFO` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FmeInfo {
    pub flags: u32,
    pub capability: u32,
}

impl FmeInfo {
    pub const MINSZ: usize = 12;

    /// Fill the caller's block, leaving its `argsz` untouched
    pub fn encode(&self, arg: &mut [u8]) -> Result<()> {
        check_argsz(arg, Self::MINSZ)?;
        put_word(arg, 1, self.flags)?;
        put_word(arg, 2, self.capability)
    }
}

/// `FPGA_FME_PORT_RELEASE` / `FPGA_FME_PORT_ASSIGN` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FmePort {
    pub flags: u32,
    pub port_id: u32,
}

impl FmePort {
    pub const MINSZ: usize = 12;

    pub fn decode(arg: &[u8]) -> Result<Self> {
        check_argsz(arg, Self::MINSZ)?;
        Ok(Self {
            flags: word(arg, 1)?,
            port_id: word(arg, 2)?,
        })
    }

    pub fn encode(&self, arg: &mut [u8]) -> Result<()> {
        put_word(arg, 0, Self::MINSZ as u32)?;
        put_word(arg, 1, self.flags)?;
        put_word(arg, 2, self.port_id)
    }
}

/// `FPGA_FME_ERR_SET_IRQ` request: bind `vectors` to interrupts starting at `start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrqSet {
    pub start: u32,
    pub vectors: Vec<i32>,
}

impl IrqSet {
    pub const MINSZ: usize = 8;

    pub fn decode(arg: &[u8]) -> Result<Self> {
        let start = word(arg, 0)?;
        let count = word(arg, 1)? as usize;
        let needed = count
            .checked_mul(4)
            .and_then(|n| n.checked_add(Self::MINSZ))
            .ok_or_else(|| FpgaError::invalid(format!("irq count {count} overflows")))?;
        if arg.len() < needed {
            return Err(FpgaError::invalid(format!(
                "{count} vectors need {needed} bytes, got {}",
                arg.len()
            )));
        }

        let vectors = (0..count)
            .map(|i| word(arg, 2 + i).map(|w| w as i32))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { start, vectors })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::MINSZ + 4 * self.vectors.len());
        out.extend_from_slice(&self.start.to_le_bytes());
        out.extend_from_slice(&(self.vectors.len() as u32).to_le_bytes());
        for v in &self.vectors {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }
}

/// Store a single u32 reply (`FPGA_FME_ERR_GET_IRQ_NUM`)
pub fn put_u32(arg: &mut [u8], value: u32) -> Result<()> {
    put_word(arg, 0, value)
}

pub fn get_u32(arg: &[u8]) -> Result<u32> {
    word(arg, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(FPGA_GET_API_VERSION, 0xB600);
        assert_eq!(FPGA_FME_PORT_ASSIGN, 0xB683);
    }

    #[test]
    fn test_port_block() {
        let mut arg = [0u8; 12];
        FmePort { flags: 0, port_id: 1 }.encode(&mut arg).unwrap();
        assert_eq!(FmePort::decode(&arg).unwrap().port_id, 1);
    }

    #[test]
    fn test_short_argsz_rejected() {
        let mut arg = [0u8; 12];
        arg[0] = 8;
        assert!(matches!(FmePort::decode(&arg), Err(FpgaError::InvalidArgument(_))));
        // a larger argsz than we know is fine
        arg[0] = 16;
        assert!(FmePort::decode(&arg).is_ok());
        // but the buffer itself must hold the minimum layout
        assert!(FmePort::decode(&arg[..8]).is_err());
    }

    #[test]
    fn test_info_keeps_argsz() {
        let mut arg = [0u8; 16];
        arg[0] = 16;
        FmeInfo { flags: 0, capability: 0x1234 }.encode(&mut arg).unwrap();
        assert_eq!(get_u32(&arg).unwrap(), 16);
        assert_eq!(word(&arg, 2).unwrap(), 0x1234);
    }

    #[test]
    fn test_irq_set_length() {
        let set = IrqSet { start: 1, vectors: vec![5, IRQ_UNBIND] };
        let bytes = set.encode();
        assert_eq!(IrqSet::decode(&bytes).unwrap(), set);
        assert!(IrqSet::decode(&bytes[..12]).is_err());
    }
}
