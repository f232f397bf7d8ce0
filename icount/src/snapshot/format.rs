//! Snapshot line format
//!
//! ```text
//! <address>:<size>:<exec_count>
//! 0x401000:4:1532
//! ```
//!
//! Dumps always write the address as `0x` + lowercase hex. Parsing is more
//! lenient because older snapshots carried other prefixes:
//!
//! - up to two non-numeric characters before the address are skipped
//!   (`0x`, `0X`, `x`, `#`, `@`, ...);
//! - the address is hex when the skipped prefix ends in `x`/`X` or when the
//!   digits contain `a`-`f`, decimal otherwise;
//! - surrounding whitespace and a trailing `\r` are ignored.

use icount_common::{SNAPSHOT_FIELD_SEPARATOR, SNAPSHOT_MAX_ADDRESS_PREFIX};
use std::fmt;

use crate::domain::{Address, MalformedLine, UniqueInstruction};

/// One parsed snapshot line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub address: Address,
    pub size: u32,
    pub exec_count: u64,
}

impl From<&UniqueInstruction> for SnapshotRecord {
    fn from(instr: &UniqueInstruction) -> Self {
        Self { address: instr.address, size: instr.size, exec_count: instr.exec_count }
    }
}

impl fmt::Display for SnapshotRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:x}{sep}{}{sep}{}",
            self.address,
            self.size,
            self.exec_count,
            sep = SNAPSHOT_FIELD_SEPARATOR
        )
    }
}

/// Parse the address field, tolerating a short non-numeric prefix.
///
/// # Errors
/// [`MalformedLine::InvalidAddress`] if nothing numeric remains or the digits
/// do not fit in 64 bits.
pub fn parse_address(field: &str) -> Result<Address, MalformedLine> {
    let field = field.trim();
    let invalid = || MalformedLine::InvalidAddress(field.to_string());

    let prefix_len = field
        .char_indices()
        .take(SNAPSHOT_MAX_ADDRESS_PREFIX)
        .take_while(|(_, c)| !c.is_ascii_digit() && !is_hex_letter(*c))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    let (prefix, digits) = field.split_at(prefix_len);

    // `0x` is digit-led, so the loop above leaves it in place
    let (prefix, digits) = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(rest) if prefix.is_empty() => ("0x", rest),
        _ => (prefix, digits),
    };

    if digits.is_empty() {
        return Err(invalid());
    }

    let hex = prefix.ends_with(['x', 'X']) || digits.chars().any(is_hex_letter);
    let value = if hex { u64::from_str_radix(digits, 16) } else { digits.parse::<u64>() };
    value.map(Address).map_err(|_| invalid())
}

fn is_hex_letter(c: char) -> bool {
    matches!(c, 'a'..='f' | 'A'..='F')
}

/// Parse one `address:size:count` line.
///
/// # Errors
/// A [`MalformedLine`] describing the first bad field.
pub fn parse_line(line: &str) -> Result<SnapshotRecord, MalformedLine> {
    let mut fields = line.trim().split(SNAPSHOT_FIELD_SEPARATOR);

    let address = fields.next().filter(|f| !f.trim().is_empty());
    let address = parse_address(address.ok_or(MalformedLine::MissingField("address"))?)?;

    let size = fields.next().ok_or(MalformedLine::MissingField("size"))?.trim();
    let size = size.parse::<u32>().map_err(|_| MalformedLine::InvalidSize(size.to_string()))?;

    let count = fields.next().ok_or(MalformedLine::MissingField("exec_count"))?.trim();
    let exec_count =
        count.parse::<u64>().map_err(|_| MalformedLine::InvalidCount(count.to_string()))?;

    if let Some(extra) = fields.next() {
        return Err(MalformedLine::TrailingField(extra.to_string()));
    }

    Ok(SnapshotRecord { address, size, exec_count })
}
