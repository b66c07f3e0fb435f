//! Cache-key fingerprints derived from a `Vary` response header.
//!
//! A [`Vary`] record captures, for one response, the request header
//! names listed in `Vary` together with the values the varying request
//! actually sent. Two requests hit the same cache entry only when every
//! captured value matches.

use http::HeaderMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VaryMatch {
    /// The records disagree on which headers vary.
    None,
    /// Same varying headers, different values.
    ValuesDiffer,
    Equals,
}

/// Parallel name/value vectors; `values[i]` is the request's value for
/// `names[i]` at capture time (empty when the header was absent).
#[derive(Debug, Clone, Default)]
pub struct Vary {
    names: Vec<String>,
    values: Vec<String>,
}

impl Vary {
    /// Builds a record from a `Vary` header value (a comma-separated
    /// list of request header names) and the request's headers.
    pub fn create(vary_header: &str, request_headers: &HeaderMap) -> Vary {
        let mut names = Vec::new();
        let mut values = Vec::new();

        for token in vary_header.split(',') {
            let name = token.trim();
            if name.is_empty() {
                continue;
            }

            let value = request_headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            names.push(name.to_string());
            values.push(value);
        }

        Vary { names, values }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(String::as_str).zip(self.values.iter().map(String::as_str))
    }

    /// Compares the captured values against another request's headers.
    pub fn match_headers(&self, request_headers: &HeaderMap) -> VaryMatch {
        for (name, captured) in self.iter() {
            let current = request_headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default();
            if current != captured {
                return VaryMatch::ValuesDiffer;
            }
        }
        VaryMatch::Equals
    }

    /// Compares two records for cache-entry identity.
    pub fn match_record(&self, other: &Vary) -> VaryMatch {
        if self.names.len() != other.names.len() {
            return VaryMatch::None;
        }

        for (a, b) in self.names.iter().zip(other.names.iter()) {
            if !a.eq_ignore_ascii_case(b) {
                return VaryMatch::None;
            }
        }

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            if a != b {
                return VaryMatch::ValuesDiffer;
            }
        }

        VaryMatch::Equals
    }
}
