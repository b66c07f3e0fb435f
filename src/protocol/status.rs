//! Reason phrases for the status line.
//!
//! The wire format is `HTTP/M.m CODE REASON`; the three-digit code comes
//! from [`http::StatusCode::as_str`], which is precomputed, and the
//! reason phrase from the table below. The table is deliberately our own
//! rather than `canonical_reason()`: the served phrases differ in a few
//! places (`200 Ok`, `302 Moved Temporarily`, `504 Gateway Timedout`)
//! and cover non-IANA codes like 444.

use http::StatusCode;

pub fn reason_phrase(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",

        200 => "Ok",
        201 => "Created",
        202 => "Accepted",
        203 => "Non Authoriative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",

        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Moved Temporarily",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",

        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Requested Range Not Satisfiable",
        417 => "Expectation Failed",
        421 => "There Are Too Many Connections From Your IP",
        422 => "Unprocessable Entity",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Unordered Collection",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        444 => "No Response",

        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timedout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        509 => "Bandwidth Exceeded",
        510 => "Not Extended",
        511 => "Network Authentication Required",

        _ => status.canonical_reason().unwrap_or("Undefined"),
    }
}

/// Statuses that must not carry a response body (RFC 7230 §3.3).
pub fn content_forbidden(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn served_phrases() {
        assert_eq!(reason_phrase(StatusCode::OK), "Ok");
        assert_eq!(reason_phrase(StatusCode::PARTIAL_CONTENT), "Partial Content");
        assert_eq!(reason_phrase(StatusCode::RANGE_NOT_SATISFIABLE), "Requested Range Not Satisfiable");
        assert_eq!(reason_phrase(StatusCode::from_u16(444).unwrap()), "No Response");
    }

    #[test]
    fn body_forbidden_statuses() {
        assert!(content_forbidden(StatusCode::CONTINUE));
        assert!(content_forbidden(StatusCode::NO_CONTENT));
        assert!(content_forbidden(StatusCode::NOT_MODIFIED));
        assert!(!content_forbidden(StatusCode::OK));
        assert!(!content_forbidden(StatusCode::NOT_FOUND));
    }
}
