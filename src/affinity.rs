//! Best-effort CPU pinning for shard workers.

/// Pin the current thread to the core at `index` (modulo the number of
/// available cores). Returns `false` when affinity is unsupported on
/// this platform; callers treat that as a silent no-op.
pub fn pin_to_core(index: usize) -> bool {
    match core_affinity::get_core_ids() {
        Some(ids) if !ids.is_empty() => core_affinity::set_for_current(ids[index % ids.len()]),
        _ => false,
    }
}
