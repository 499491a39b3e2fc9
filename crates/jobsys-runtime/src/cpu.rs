//! CPU topology, consulted once at init to size the worker pool

use jobsys_core::constants::MAX_WORKERS;

/// Number of logical cores this process may run on
///
/// On Linux this honours the affinity mask (taskset, cgroups cpusets);
/// elsewhere it falls back to `available_parallelism`.
pub fn logical_cores() -> usize {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            affinity_cores().unwrap_or_else(parallelism)
        } else {
            parallelism()
        }
    }
}

fn parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(target_os = "linux")]
fn affinity_cores() -> Option<usize> {
    use nix::sched::{sched_getaffinity, CpuSet};
    use nix::unistd::Pid;

    let set = sched_getaffinity(Pid::from_raw(0)).ok()?;
    let count = (0..CpuSet::count())
        .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
        .count();
    (count > 0).then_some(count)
}

/// Regular worker count for a core count
///
/// Leaves `reserved` cores to the submitting threads, keeps at least one
/// worker and never exceeds `MAX_WORKERS`.
pub fn worker_count_hint(logical_cores: usize, reserved: usize) -> usize {
    logical_cores.saturating_sub(reserved).clamp(1, MAX_WORKERS)
}
