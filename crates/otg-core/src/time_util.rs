//! Wall-clock timestamps.
//!
//! Order insert times and trade times travel as epoch nanoseconds. On Linux
//! the clock is read with `clock_gettime(CLOCK_REALTIME)`; elsewhere through
//! `SystemTime`.

#[cfg(target_os = "linux")]
#[inline]
fn clock_realtime() -> (i64, i64) {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: CLOCK_REALTIME is always valid. Failure returns -1 but the
    // zeroed ts is a safe fallback (epoch).
    unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
    }
    (ts.tv_sec as i64, ts.tv_nsec as i64)
}

#[cfg(not(target_os = "linux"))]
#[inline]
fn clock_realtime() -> (i64, i64) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (d.as_secs() as i64, d.subsec_nanos() as i64)
}

/// Current time as **nanoseconds** since Unix epoch.
#[inline]
pub fn now_ns() -> i64 {
    let (sec, nsec) = clock_realtime();
    sec * 1_000_000_000 + nsec
}
