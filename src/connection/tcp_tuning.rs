//! Socket-level response tuning.

#[cfg(target_os = "linux")]
pub(crate) fn set_tcp_cork(fd: std::os::unix::io::RawFd, enabled: bool) {
    let value: libc::c_int = enabled as libc::c_int;
    // advisory; a failure only costs a few small packets
    unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_CORK,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
pub(crate) fn set_tcp_cork(_fd: std::os::unix::io::RawFd, _enabled: bool) {}

#[cfg(not(unix))]
pub(crate) fn set_tcp_cork(_fd: i32, _enabled: bool) {}
