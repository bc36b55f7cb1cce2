//! errno side channel.
//!
//! The engine reports failures as `Result`s; this is the only place they are
//! turned into the host's thread-local `errno`.

use std::ffi::c_int;

/// Stores `val` in the calling thread's `errno`.
pub fn set_abi_errno(val: c_int) {
    // SAFETY: __errno_location returns a valid TLS pointer for this thread.
    let p = unsafe { libc::__errno_location() };
    // SAFETY: pointer is valid for write per errno ABI contract.
    unsafe { *p = val };
}

/// Reads the calling thread's `errno`.
#[must_use]
pub fn abi_errno() -> c_int {
    // SAFETY: __errno_location returns a valid TLS pointer for this thread.
    unsafe { *libc::__errno_location() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_round_trips_per_thread() {
        set_abi_errno(libc::ENOMEM);
        assert_eq!(abi_errno(), libc::ENOMEM);

        let other = std::thread::spawn(|| {
            set_abi_errno(libc::EINVAL);
            abi_errno()
        })
        .join()
        .unwrap();
        assert_eq!(other, libc::EINVAL);
        assert_eq!(abi_errno(), libc::ENOMEM, "errno must be thread-local");

        set_abi_errno(0);
        assert_eq!(abi_errno(), 0);
    }
}
