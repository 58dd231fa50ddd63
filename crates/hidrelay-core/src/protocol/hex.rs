//! Hexadecimal formatting of byte slices for diagnostic logs.

use std::fmt::{self, Display, LowerHex, UpperHex};

/// Formats a byte slice as `[0x01, 0x02, ...]` for `{:x}` / `{:X}`, and as
/// compact `01 02 ...` for `{}`.
pub struct HexSlice<'a>(&'a [u8]);

impl<'a> HexSlice<'a> {
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    fn write_list(&self, f: &mut fmt::Formatter<'_>, upper: bool) -> fmt::Result {
        f.write_str("[")?;
        for (index, byte) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            if upper {
                write!(f, "{byte:#04X}")?;
            } else {
                write!(f, "{byte:#04x}")?;
            }
        }
        f.write_str("]")
    }
}

impl LowerHex for HexSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_list(f, false)
    }
}

impl UpperHex for HexSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_list(f, true)
    }
}

impl Display for HexSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
