//! Pinning the session worker thread to a CPU core.
//!
//! A gateway host usually runs many sessions side by side. Operators who want
//! a busy session's dispatch loop isolated from the rest can name a core in
//! `SessionConfig::worker_cpu_core`; the worker calls [`maybe_bind`] before
//! entering its loop.

use tracing::{info, warn};

/// Bind the current thread to the core at index `core_id`.
///
/// Returns `false` if the index is out of range or the OS refused.
pub fn bind_to_core(core_id: usize) -> bool {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    let Some(core) = core_ids.get(core_id) else {
        warn!("CPU core {core_id} not available (system has {} cores)", core_ids.len());
        return false;
    };
    let ok = core_affinity::set_for_current(*core);
    if ok {
        info!("worker bound to CPU core {core_id}");
    } else {
        warn!("failed to bind worker to CPU core {core_id}");
    }
    ok
}

/// Bind the current thread if a core is configured; negative ids mean "none".
pub fn maybe_bind(core_id: Option<i32>) -> bool {
    match core_id {
        Some(id) if id >= 0 => bind_to_core(id as usize),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_negative_core_is_ignored() {
        assert!(!maybe_bind(None));
        assert!(!maybe_bind(Some(-1)));
    }

    #[test]
    fn out_of_range_core_is_rejected() {
        assert!(!bind_to_core(usize::MAX));
    }
}
