//! Text encoding of attribute values

use crate::error::{FpgaError, Result};

/// Parse an unsigned integer the way attribute stores accept it
///
/// Accepts decimal, `0x`-prefixed hexadecimal and `0`-prefixed octal, an
/// optional leading `+` and a single trailing newline.
pub fn parse_u64(input: &str) -> Result<u64> {
    let s = input.strip_suffix('\n').unwrap_or(input);
    let s = s.strip_prefix('+').unwrap_or(s);

    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(FpgaError::invalid(format!("cannot parse {input:?} as an integer")));
    }
    u64::from_str_radix(digits, radix)
        .map_err(|_| FpgaError::invalid(format!("{input:?} is out of range")))
}

pub fn parse_u8(input: &str) -> Result<u8> {
    let value = parse_u64(input)?;
    u8::try_from(value).map_err(|_| FpgaError::invalid(format!("{value} does not fit in 8 bits")))
}

/// Parse a boolean: `y`/`Y`/`1`/`on` or `n`/`N`/`0`/`off`
pub fn parse_bool(input: &str) -> Result<bool> {
    let mut chars = input.chars();
    match (chars.next(), chars.next()) {
        (Some('y' | 'Y' | '1'), _) => Ok(true),
        (Some('n' | 'N' | '0'), _) => Ok(false),
        (Some('o' | 'O'), Some('n' | 'N')) => Ok(true),
        (Some('o' | 'O'), Some('f' | 'F')) => Ok(false),
        _ => Err(FpgaError::invalid(format!("cannot parse {input:?} as a boolean"))),
    }
}

pub fn show_dec(value: u64) -> String {
    format!("{value}\n")
}

pub fn show_hex(value: u64) -> String {
    format!("0x{value:x}\n")
}
