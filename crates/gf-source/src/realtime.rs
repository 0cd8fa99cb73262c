//! Real-time setup for the edge thread.
//!
//! Edge timestamps come from the GPIO daemon or driver, so scheduling jitter
//! never shifts a measurement. What jitter can do is delay delivery long
//! enough for the notification buffer to overflow; running the edge thread
//! under `SCHED_FIFO` with locked memory keeps it ahead of the hardware.

#![allow(unused_imports)] // Platform-specific code may not use all imports

use gf_common::config::{CpuAffinity, RealtimeConfig};
use gf_common::{FreqError, FreqResult};
use tracing::{debug, info, warn};

/// What real-time initialization actually applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealtimeStatus {
    /// Memory pages are locked.
    pub memory_locked: bool,
    /// Applied `SCHED_FIFO` priority.
    pub priority: Option<u8>,
    /// CPUs the thread is pinned to.
    pub cpu_affinity: Option<Vec<usize>>,
}

/// Apply the real-time configuration to the calling thread.
///
/// Missing privileges (`EPERM`) are logged and leave the thread on the
/// default scheduler; other failures are errors.
///
/// # Errors
///
/// Returns [`FreqError::Config`] for invalid CPU sets or unexpected OS errors.
pub fn init_realtime(config: &RealtimeConfig) -> FreqResult<RealtimeStatus> {
    if !config.enabled {
        debug!("Real-time scheduling disabled in configuration");
        return Ok(RealtimeStatus::default());
    }

    let caps = check_rt_capabilities();
    debug!(?caps, "Real-time capabilities");

    let memory_locked = if config.lock_memory {
        lock_memory()?
    } else {
        false
    };
    let priority = set_fifo_scheduler(config.priority)?;
    let cpu_affinity = set_cpu_affinity(&config.cpu_affinity)?;

    let status = RealtimeStatus {
        memory_locked,
        priority,
        cpu_affinity,
    };
    info!(?status, "Real-time initialization complete");
    Ok(status)
}

#[cfg(target_os = "linux")]
fn lock_memory() -> FreqResult<bool> {
    use nix::sys::mman::{mlockall, MlockAllFlags};

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => {
            info!("Memory locked");
            Ok(true)
        }
        Err(nix::errno::Errno::EPERM) => {
            warn!("mlockall failed with EPERM, continuing without locked memory (needs CAP_IPC_LOCK)");
            Ok(false)
        }
        Err(e) => Err(FreqError::Config(format!("mlockall failed: {e}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn lock_memory() -> FreqResult<bool> {
    warn!("mlockall not available on this platform");
    Ok(false)
}

/// Priority clamped to the `SCHED_FIFO` range.
fn clamp_priority(priority: u8) -> u8 {
    let clamped = priority.clamp(1, 99);
    if clamped != priority {
        warn!(
            original = priority,
            clamped, "Scheduler priority clamped to valid range"
        );
    }
    clamped
}

#[cfg(target_os = "linux")]
fn set_fifo_scheduler(priority: u8) -> FreqResult<Option<u8>> {
    let priority = clamp_priority(priority);
    let param = libc::sched_param {
        sched_priority: i32::from(priority),
    };

    // SAFETY: param is a valid sched_param and pid 0 is the calling thread
    #[allow(unsafe_code)]
    let result = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!("sched_setscheduler failed with EPERM, edge thread stays on SCHED_OTHER (needs CAP_SYS_NICE)");
            return Ok(None);
        }
        return Err(FreqError::Config(format!("sched_setscheduler failed: {err}")));
    }

    info!(priority, "SCHED_FIFO configured");
    Ok(Some(priority))
}

#[cfg(not(target_os = "linux"))]
fn set_fifo_scheduler(priority: u8) -> FreqResult<Option<u8>> {
    warn!(priority, "Real-time scheduling not available on this platform");
    Ok(None)
}

fn affinity_cpus(affinity: &CpuAffinity) -> Vec<usize> {
    match affinity {
        CpuAffinity::None => Vec::new(),
        CpuAffinity::Single(cpu) => vec![*cpu],
        CpuAffinity::Set(cpus) => cpus.clone(),
    }
}

#[cfg(target_os = "linux")]
fn set_cpu_affinity(affinity: &CpuAffinity) -> FreqResult<Option<Vec<usize>>> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let cpus = affinity_cpus(affinity);
    if cpus.is_empty() {
        return Ok(None);
    }

    let mut cpu_set = CpuSet::new();
    for &cpu in &cpus {
        cpu_set
            .set(cpu)
            .map_err(|e| FreqError::Config(format!("invalid CPU index {cpu}: {e}")))?;
    }

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            info!(?cpus, "CPU affinity set");
            Ok(Some(cpus))
        }
        Err(nix::errno::Errno::EINVAL) => {
            warn!(?cpus, "Invalid CPU set, some CPUs may not exist");
            Ok(None)
        }
        Err(e) => Err(FreqError::Config(format!("sched_setaffinity failed: {e}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn set_cpu_affinity(affinity: &CpuAffinity) -> FreqResult<Option<Vec<usize>>> {
    if !affinity_cpus(affinity).is_empty() {
        warn!("CPU affinity not available on this platform");
    }
    Ok(None)
}

/// Real-time related limits of the running process.
#[derive(Debug, Clone, Default)]
pub struct RtCapabilities {
    /// Running as root.
    pub is_root: bool,
    /// RLIMIT_RTPRIO soft limit.
    pub rtprio_limit: Option<u64>,
    /// RLIMIT_MEMLOCK soft limit.
    pub memlock_limit: Option<u64>,
}

impl RtCapabilities {
    /// `SCHED_FIFO` is likely to be granted.
    pub fn can_use_rt_scheduling(&self) -> bool {
        self.is_root || self.rtprio_limit.is_some_and(|l| l > 0)
    }
}

/// Query the process limits relevant to real-time setup.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn check_rt_capabilities() -> RtCapabilities {
    let mut caps = RtCapabilities {
        // SAFETY: geteuid has no preconditions
        is_root: unsafe { libc::geteuid() } == 0,
        ..Default::default()
    };

    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: rlim is a valid out-pointer
    if unsafe { libc::getrlimit(libc::RLIMIT_RTPRIO, &mut rlim) } == 0 {
        caps.rtprio_limit = Some(u64::from(rlim.rlim_cur));
    }
    // SAFETY: as above
    if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut rlim) } == 0 {
        caps.memlock_limit = Some(u64::from(rlim.rlim_cur));
    }
    caps
}

/// Defaults everywhere but Linux, where the limits are queried.
#[cfg(not(target_os = "linux"))]
pub fn check_rt_capabilities() -> RtCapabilities {
    RtCapabilities::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_noop() {
        let status = init_realtime(&RealtimeConfig::default()).unwrap();
        assert_eq!(status, RealtimeStatus::default());
    }

    #[test]
    fn test_priority_clamped() {
        assert_eq!(clamp_priority(0), 1);
        assert_eq!(clamp_priority(80), 80);
        assert_eq!(clamp_priority(200), 99);
    }

    #[test]
    fn test_affinity_cpus() {
        assert!(affinity_cpus(&CpuAffinity::None).is_empty());
        assert_eq!(affinity_cpus(&CpuAffinity::Single(2)), vec![2]);
        assert_eq!(affinity_cpus(&CpuAffinity::Set(vec![1, 3])), vec![1, 3]);
    }

    #[test]
    fn test_rt_capabilities() {
        let caps = check_rt_capabilities();
        let _ = caps.can_use_rt_scheduling();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cpu_affinity_none() {
        assert!(set_cpu_affinity(&CpuAffinity::None).unwrap().is_none());
    }
}
