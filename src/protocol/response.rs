//! Response head: status line fields plus the ordered header list.

use crate::protocol::HeaderList;
use http::{StatusCode, Version};

/// Everything that precedes a response body on the wire.
///
/// Built by the request's serialization step and consumed by the
/// response encoder, which turns it into `HTTP/M.m CODE REASON` plus the
/// headers in their insertion order.
#[derive(Debug)]
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    pub headers: HeaderList,
}

impl ResponseHead {
    pub fn new(version: Version, status: StatusCode) -> Self {
        Self { version, status, headers: HeaderList::new() }
    }
}
