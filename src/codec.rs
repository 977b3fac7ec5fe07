//! Base-36 identifier codec
//!
//! Item ranges are written with compact base-36 identifiers (`0-9a-z`). The
//! encoding is the minimal-length representation: no leading zeros except for
//! the value zero itself, which encodes as `"0"`.

use crate::error::{ItemError, Result};

/// Digits of the identifier alphabet, in value order
pub const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

const BASE: u64 = ALPHABET.len() as u64;

/// Encode a non-negative integer as a base-36 identifier
///
/// ```
/// use warc_worker::codec::encode;
///
/// assert_eq!(encode(0), "0");
/// assert_eq!(encode(35), "z");
/// assert_eq!(encode(36), "10");
/// ```
#[must_use]
pub fn encode(mut num: u64) -> String {
    if num == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::with_capacity(13);
    while num > 0 {
        digits.push(ALPHABET[(num % BASE) as usize]);
        num /= BASE;
    }
    digits.reverse();

    // digits only ever holds ASCII alphabet bytes
    digits.into_iter().map(char::from).collect()
}

/// Decode a base-36 identifier
///
/// Fails with [`ItemError::MalformedIdentifier`] for an empty string, any
/// character outside the alphabet (including uppercase), or a value that does
/// not fit in a `u64`.
pub fn decode(value: &str) -> Result<u64> {
    if value.is_empty() {
        return Err(malformed(value, "identifier is empty".to_string()));
    }

    let mut num: u64 = 0;
    for ch in value.chars() {
        let digit = digit_value(ch)
            .ok_or_else(|| malformed(value, format!("character {ch:?} is not base-36")))?;
        num = num
            .checked_mul(BASE)
            .and_then(|n| n.checked_add(digit))
            .ok_or_else(|| malformed(value, "value does not fit in 64 bits".to_string()))?;
    }
    Ok(num)
}

fn digit_value(ch: char) -> Option<u64> {
    match ch {
        '0'..='9' => Some(ch as u64 - '0' as u64),
        'a'..='z' => Some(ch as u64 - 'a' as u64 + 10),
        _ => None,
    }
}

fn malformed(value: &str, reason: String) -> crate::error::Error {
    ItemError::MalformedIdentifier {
        value: value.to_string(),
        reason,
    }
    .into()
}

/// Generates item names covering an identifier space in fixed-size chunks
///
/// Yields `<type>:<lo>:<hi>` for consecutive chunks of `per_item` identifiers
/// from `start` through `end` inclusive; the last chunk may be shorter.
///
/// ```
/// use warc_worker::codec::RangeNames;
///
/// let names: Vec<_> = RangeNames::new("image", 0, 250, 100).collect();
/// assert_eq!(names, ["image:0:2r", "image:2s:5j", "image:5k:6y"]);
/// ```
#[derive(Debug, Clone)]
pub struct RangeNames {
    prefix: String,
    next: Option<u64>,
    end: u64,
    per_item: u64,
}

impl RangeNames {
    /// Create a generator; a `per_item` of zero is treated as one
    pub fn new(prefix: impl Into<String>, start: u64, end: u64, per_item: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: (start <= end).then_some(start),
            end,
            per_item: per_item.max(1),
        }
    }
}

impl Iterator for RangeNames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let lower = self.next?;
        let upper = lower.saturating_add(self.per_item - 1).min(self.end);
        self.next = upper.checked_add(1).filter(|n| *n <= self.end);
        Some(format!("{}:{}:{}", self.prefix, encode(lower), encode(upper)))
    }
}
