//! Size tokens with unit suffixes and their conversion into page counts.

use crate::memory::{PAGE_BYTES, PAGE_MASK, PAGE_SHIFT};
use crate::ConfigError;

/// One kibibyte.
pub const KIB: u64 = 1024;
/// One mebibyte.
pub const MIB: u64 = KIB * 1024;
/// One gibibyte.
pub const GIB: u64 = MIB * 1024;

/// A size or address as given by the host: a bare count or a suffixed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeToken<'a> {
    /// Count scaled by the caller's default units.
    Count(u64),
    /// String such as `"64"`, `"128k"`, `"2m"` or `"3p"`.
    Text(&'a str),
}

impl From<u64> for SizeToken<'_> {
    fn from(value: u64) -> Self {
        Self::Count(value)
    }
}

impl From<u32> for SizeToken<'_> {
    fn from(value: u32) -> Self {
        Self::Count(u64::from(value))
    }
}

impl<'a> From<&'a str> for SizeToken<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

/// Splits a size string into `(count, units)`.
///
/// An all-digit string keeps `default_units`. Otherwise the last character
/// selects the units: `k`, `m`, `g` (binary multiples) or `p` (pages).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSize`] for empty or non-numeric cores and
/// [`ConfigError::UnknownUnit`] for an unrecognized suffix.
pub fn parse_size(token: &str, default_units: u64) -> Result<(u64, u64), ConfigError> {
    let invalid = || ConfigError::InvalidSize(token.to_owned());

    if token.is_empty() {
        return Err(invalid());
    }
    if token.bytes().all(|b| b.is_ascii_digit()) {
        let count = token.parse().map_err(|_| invalid())?;
        return Ok((count, default_units));
    }

    let mut chars = token.chars();
    let suffix = chars.next_back().ok_or_else(invalid)?;
    let units = match suffix.to_ascii_lowercase() {
        'k' => KIB,
        'm' => MIB,
        'g' => GIB,
        'p' => u64::from(PAGE_BYTES),
        other => return Err(ConfigError::UnknownUnit(other)),
    };
    let core = chars.as_str();
    if core.is_empty() || !core.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let count = core.parse().map_err(|_| invalid())?;
    Ok((count, units))
}

/// Resolves a size token into a page count.
///
/// # Errors
///
/// Returns [`ConfigError::Misaligned`] when the byte size is not page aligned
/// and `auto_align` is off, [`ConfigError::SizeOverflow`] when the result does
/// not fit, and any error of [`parse_size`].
pub fn pages_for(token: SizeToken<'_>, units: u64, auto_align: bool) -> Result<u32, ConfigError> {
    let (count, units) = match token {
        SizeToken::Count(count) => (count, units),
        SizeToken::Text(text) => parse_size(text, units)?,
    };
    let bytes = count
        .checked_mul(units)
        .ok_or(ConfigError::SizeOverflow { bytes: u64::MAX })?;

    let pages = if bytes & u64::from(PAGE_MASK) == 0 {
        bytes >> PAGE_SHIFT
    } else if auto_align {
        bytes.div_ceil(u64::from(PAGE_BYTES))
    } else {
        return Err(ConfigError::Misaligned { bytes });
    };

    u32::try_from(pages).map_err(|_| ConfigError::SizeOverflow { bytes })
}
