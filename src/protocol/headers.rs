//! Insertion-ordered response header list.
//!
//! Response headers are emitted on the wire in exactly the order the
//! application pushed them, duplicates are allowed, and lookup is a
//! linear case-insensitive scan. `http::HeaderMap` offers none of those
//! guarantees, so responses carry this list instead; names and values
//! still use the `http` crate types so validity is checked at the edge.

use http::header::{HeaderName, HeaderValue};

#[derive(Debug, Default, Clone)]
pub struct HeaderList {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Appends a header, keeping any existing entries with the same name.
    pub fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.entries.push((name, value));
    }

    /// Returns the first value for `name`, if any.
    ///
    /// `HeaderName` is stored case-normalized, so an equality scan is a
    /// case-insensitive match.
    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.get(name).is_some()
    }

    /// Replaces the first entry named `name` (removing later duplicates),
    /// or appends when absent.
    pub fn overwrite(&mut self, name: HeaderName, value: HeaderValue) {
        let mut slot = None;
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].0 == name {
                if slot.is_none() {
                    slot = Some(i);
                    i += 1;
                } else {
                    self.entries.remove(i);
                }
            } else {
                i += 1;
            }
        }

        match slot {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Removes every entry named `name`; reports whether any existed.
    pub fn remove(&mut self, name: &HeaderName) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        before != self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE};

    #[test]
    fn preserves_insertion_order_and_duplicates() {
        let mut headers = HeaderList::new();
        headers.push(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.push(HeaderName::from_static("set-cookie"), HeaderValue::from_static("a=1"));
        headers.push(HeaderName::from_static("set-cookie"), HeaderValue::from_static("b=2"));

        let order: Vec<_> = headers.iter().map(|(n, v)| (n.as_str(), v.to_str().unwrap())).collect();
        assert_eq!(order, vec![("content-type", "text/plain"), ("set-cookie", "a=1"), ("set-cookie", "b=2")]);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = HeaderList::new();
        headers.push(HeaderName::from_static("x-answer"), HeaderValue::from_static("42"));

        let name: HeaderName = "X-Answer".parse().unwrap();
        assert_eq!(headers.get(&name).unwrap(), "42");
    }

    #[test]
    fn overwrite_collapses_duplicates_in_place() {
        let mut headers = HeaderList::new();
        headers.push(CONTENT_TYPE, HeaderValue::from_static("a"));
        headers.push(CONTENT_LENGTH, HeaderValue::from_static("1"));
        headers.push(CONTENT_TYPE, HeaderValue::from_static("b"));

        headers.overwrite(CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let order: Vec<_> = headers.iter().map(|(n, v)| (n.as_str(), v.to_str().unwrap())).collect();
        assert_eq!(order, vec![("content-type", "text/html"), ("content-length", "1")]);
    }
}
