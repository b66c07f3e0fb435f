//! Request-target decoder: percent-decoding plus virtual-root depth
//! tracking in a single pass.
//!
//! The decoder is a byte state machine over the unparsed request target.
//! Decoded escape bytes are fed back into the machine, so `%2e%2e`
//! participates in `..` segment tracking exactly like a literal `..` —
//! that is what makes encoded directory-traversal attempts visible in
//! the resulting depth counter. `+` is left untouched: a path is not a
//! form body.

use thiserror::Error;

/// Result of decoding a request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTarget {
    /// Percent-decoded, 8-bit-clean path. Begins with `/`, or equals `*`
    /// for the server-wide OPTIONS form.
    pub path: Vec<u8>,
    /// Raw query bytes, leading run of `?` collapsed. `None` when the
    /// target carries no query part.
    pub query: Option<Vec<u8>>,
    /// Net directory depth. Each new path segment adds one, each `..`
    /// removes one; a negative value means the path escaped the virtual
    /// root.
    pub depth: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    /// `%` not followed by two hex digits (including at end of input).
    #[error("invalid percent escape in request target")]
    BadEscape,
    /// An escape decoded to NUL.
    #[error("NUL byte injected into request target")]
    NulByte,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum State {
    Content,
    Slash,
    Dot,
    DotDot,
    QuoteStart,
    QuoteChar2,
    QueryStart,
}

pub fn decode_target(raw: &[u8]) -> Result<DecodedTarget, UriError> {
    // special case from RFC 2616 section 5.1.2
    if raw == b"*" {
        return Ok(DecodedTarget { path: b"*".to_vec(), query: None, depth: 0 });
    }

    let mut path = Vec::with_capacity(raw.len());
    let mut query = None;
    let mut depth = 0i32;

    let mut state = State::Content;
    let mut quoted_state = State::Content;
    let mut decoded_hi = 0u8;

    let mut iter = raw.iter().copied().enumerate();
    let mut cur = iter.next();

    while let Some((idx, ch)) = cur {
        match state {
            State::Content => match ch {
                b'/' => {
                    path.push(ch);
                    state = State::Slash;
                    cur = iter.next();
                }
                b'%' => {
                    quoted_state = state;
                    state = State::QuoteStart;
                    cur = iter.next();
                }
                b'?' => {
                    state = State::QueryStart;
                    cur = iter.next();
                }
                _ => {
                    path.push(ch);
                    cur = iter.next();
                }
            },
            State::Slash => match ch {
                b'/' => {
                    // repeated slash "//"
                    path.push(ch);
                    cur = iter.next();
                }
                b'.' => {
                    path.push(ch);
                    state = State::Dot;
                    cur = iter.next();
                }
                b'%' => {
                    quoted_state = state;
                    state = State::QuoteStart;
                    cur = iter.next();
                }
                b'?' => {
                    state = State::QueryStart;
                    depth += 1;
                    cur = iter.next();
                }
                _ => {
                    path.push(ch);
                    state = State::Content;
                    depth += 1;
                    cur = iter.next();
                }
            },
            State::Dot => match ch {
                b'/' => {
                    // "/./" collapses into the pending slash
                    path.push(ch);
                    state = State::Slash;
                    cur = iter.next();
                }
                b'.' => {
                    path.push(ch);
                    state = State::DotDot;
                    cur = iter.next();
                }
                b'%' => {
                    quoted_state = state;
                    state = State::QuoteStart;
                    cur = iter.next();
                }
                b'?' => {
                    state = State::QueryStart;
                    depth += 1;
                    cur = iter.next();
                }
                _ => {
                    path.push(ch);
                    state = State::Content;
                    depth += 1;
                    cur = iter.next();
                }
            },
            State::DotDot => match ch {
                b'/' => {
                    // the slash after ".." is what leaves the segment
                    path.push(ch);
                    depth -= 1;
                    state = State::Slash;
                    cur = iter.next();
                }
                b'%' => {
                    quoted_state = state;
                    state = State::QuoteStart;
                    cur = iter.next();
                }
                _ => {
                    // "..x" and friends are ordinary segments
                    path.push(ch);
                    state = State::Content;
                    depth += 1;
                    cur = iter.next();
                }
            },
            State::QuoteStart => match hex_value(ch) {
                Some(v) => {
                    decoded_hi = v << 4;
                    state = State::QuoteChar2;
                    cur = iter.next();
                }
                None => return Err(UriError::BadEscape),
            },
            State::QuoteChar2 => match hex_value(ch) {
                Some(v) => {
                    let decoded = decoded_hi | v;
                    match decoded {
                        0 => return Err(UriError::NulByte),
                        b'%' => {
                            // double escape yields a literal percent
                            path.push(b'%');
                            state = State::Content;
                            cur = iter.next();
                        }
                        _ => {
                            // reprocess the decoded byte in the state the
                            // escape interrupted, without consuming input
                            state = quoted_state;
                            cur = Some((idx, decoded));
                        }
                    }
                }
                None => return Err(UriError::BadEscape),
            },
            State::QueryStart => {
                if ch == b'?' {
                    // skip repeated "?"s
                    cur = iter.next();
                } else {
                    query = Some(raw[idx..].to_vec());
                    break;
                }
            }
        }
    }

    match state {
        State::QuoteStart | State::QuoteChar2 => Err(UriError::BadEscape),
        State::QueryStart if query.is_none() => {
            // bare trailing "?"
            Ok(DecodedTarget { path, query: Some(Vec::new()), depth })
        }
        _ => Ok(DecodedTarget { path, query, depth }),
    }
}

#[inline]
fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(s: &str) -> DecodedTarget {
        decode_target(s.as_bytes()).unwrap()
    }

    #[test]
    fn plain_path_is_unchanged() {
        let t = decode("/index.html");
        assert_eq!(t.path, b"/index.html");
        assert_eq!(t.query, None);
        assert_eq!(t.depth, 1);
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(decode("/a/b/c").depth, 3);
        assert_eq!(decode("/a//b").depth, 2);
        assert_eq!(decode("/a/./b").depth, 2);
        assert_eq!(decode("/a/../b").depth, 1);
        assert_eq!(decode("/").depth, 0);
    }

    #[test]
    fn dotdot_can_escape_the_root() {
        let t = decode("/../../etc");
        assert_eq!(t.path, b"/../../etc");
        assert!(t.depth < 0);
    }

    #[test]
    fn encoded_dots_participate_in_depth_tracking() {
        let t = decode("/%2e%2e/%2e%2e/etc");
        assert_eq!(t.path, b"/../../etc");
        assert!(t.depth < 0);
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(decode("/a%20b").path, b"/a b");
        assert_eq!(decode("/a%2Fb").path, b"/a/b");
    }

    #[test]
    fn double_escape_yields_literal_percent() {
        assert_eq!(decode("/a%25b").path, b"/a%b");
    }

    #[test]
    fn plus_is_not_space() {
        assert_eq!(decode("/a+b").path, b"/a+b");
    }

    #[test]
    fn query_is_split_off_raw() {
        let t = decode("/path?a=1&b=2");
        assert_eq!(t.path, b"/path");
        assert_eq!(t.query.as_deref(), Some(&b"a=1&b=2"[..]));
    }

    #[test]
    fn repeated_question_marks_collapse() {
        let t = decode("/p??a=1");
        assert_eq!(t.path, b"/p");
        assert_eq!(t.query.as_deref(), Some(&b"a=1"[..]));
    }

    #[test]
    fn asterisk_form() {
        let t = decode("*");
        assert_eq!(t.path, b"*");
        assert_eq!(t.depth, 0);
    }

    #[test]
    fn bad_escapes_are_rejected() {
        assert_eq!(decode_target(b"/a%zz"), Err(UriError::BadEscape));
        assert_eq!(decode_target(b"/a%2"), Err(UriError::BadEscape));
        assert_eq!(decode_target(b"/a%"), Err(UriError::BadEscape));
        assert_eq!(decode_target(b"/a%00b"), Err(UriError::NulByte));
    }
}
