//! `Range:` request header parsing and resolution.
//!
//! A parsed header is an ordered list of `(first, last)` pairs where either
//! endpoint may be absent: `(None, Some(n))` is a suffix range (the last
//! `n` bytes), `(Some(a), None)` runs from `a` to the end of the
//! representation. Parsing failures are reported as `None` so the caller
//! falls back to a full response, per RFC 7233 — only a syntactically
//! valid but unsatisfiable range earns a 416.

/// One raw range as written by the client.
pub type ByteRange = (Option<u64>, Option<u64>);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSpec {
    ranges: Vec<ByteRange>,
}

impl RangeSpec {
    /// Parses a `Range` header value such as `bytes=0-9,90-99,-5`.
    ///
    /// Returns `None` for anything malformed: wrong unit, empty range
    /// list, a range with neither endpoint, junk bytes, or overflow.
    pub fn parse(value: &[u8]) -> Option<RangeSpec> {
        let value = std::str::from_utf8(value).ok()?;
        let rest = value.trim().strip_prefix("bytes")?;
        let rest = rest.trim_start().strip_prefix('=')?;

        let mut ranges = Vec::new();
        for part in rest.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }

            let (first, last) = part.split_once('-')?;
            let first = parse_endpoint(first)?;
            let last = parse_endpoint(last)?;
            if first.is_none() && last.is_none() {
                return None;
            }

            ranges.push((first, last));
        }

        if ranges.is_empty() {
            return None;
        }

        Some(RangeSpec { ranges })
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ByteRange> {
        self.ranges.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ByteRange> {
        self.ranges.get(index)
    }
}

/// Empty string means an absent endpoint; otherwise a decimal integer.
fn parse_endpoint(s: &str) -> Option<Option<u64>> {
    let s = s.trim();
    if s.is_empty() {
        return Some(None);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok().map(Some)
}

/// Resolves a raw range against the representation size into inclusive
/// `(first, last)` offsets.
///
/// Suffix ranges take the final `n` bytes, open-ended ranges run to
/// `size - 1`, and an overlong `last` is clamped to the representation.
/// `None` means the range is unsatisfiable (416 material).
pub fn resolve(range: ByteRange, size: u64) -> Option<(u64, u64)> {
    if size == 0 {
        return None;
    }

    match range {
        (None, Some(suffix)) => {
            if suffix == 0 {
                return None;
            }
            Some((size.saturating_sub(suffix), size - 1))
        }
        (Some(first), None) => {
            if first >= size {
                return None;
            }
            Some((first, size - 1))
        }
        (Some(first), Some(last)) => {
            let last = last.min(size - 1);
            if first > last {
                return None;
            }
            Some((first, last))
        }
        (None, None) => None,
    }
}
