//! Real-time environment initialization.
//!
//! Deterministic dispatch needs three things before the toggle loop starts:
//! - Memory locking (mlockall) so no page fault lands mid-cycle
//! - Stack pre-faulting so the loop's stack pages are already resident
//! - SCHED_FIFO/SCHED_RR priority for both activity threads
//!
//! Full support on Linux; no-ops elsewhere. Missing privileges degrade to a
//! warning so the generator still runs, just without hard timing bounds.

#![allow(unused_imports)] // Platform-specific code may not use all imports

use pulsegen_common::{PulseError, PulseResult, RealtimeConfig, SchedPolicy};
use tracing::{debug, info, warn};

/// Result of process-wide real-time initialization.
#[derive(Debug, Clone)]
pub struct RealtimeStatus {
    /// Whether memory was locked successfully.
    pub memory_locked: bool,
    /// Stack bytes pre-faulted.
    pub stack_prefaulted: usize,
}

/// Initialize the process-wide parts of the real-time environment:
/// memory locking and stack pre-faulting. Scheduling priority is applied
/// per thread via [`apply_thread_scheduling`].
///
/// # Errors
///
/// Returns an error only for unexpected mlockall failures; EPERM degrades
/// to a warning.
pub fn init_realtime(config: &RealtimeConfig) -> PulseResult<RealtimeStatus> {
    if !config.enabled {
        info!("real-time setup disabled in configuration");
        return Ok(RealtimeStatus {
            memory_locked: false,
            stack_prefaulted: 0,
        });
    }

    let memory_locked = if config.lock_memory {
        lock_memory()?
    } else {
        false
    };

    let stack_prefaulted = prefault_stack(config.prefault_stack_size);

    let status = RealtimeStatus {
        memory_locked,
        stack_prefaulted,
    };
    info!(?status, "real-time environment initialized");
    Ok(status)
}

/// Apply the configured scheduling policy and priority to the calling
/// thread. Both the driver and the control channel call this on startup so
/// they run at equal, maximal priority.
///
/// Returns the applied priority, or `None` when RT scheduling was skipped
/// (disabled, `Other` policy, or missing privileges).
pub fn apply_thread_scheduling(config: &RealtimeConfig) -> PulseResult<Option<u8>> {
    if !config.enabled {
        return Ok(None);
    }
    set_scheduler(config.policy, config.priority)
}

/// Lock all current and future memory pages.
#[cfg(target_os = "linux")]
fn lock_memory() -> PulseResult<bool> {
    use nix::sys::mman::{mlockall, MlockAllFlags};

    debug!("locking memory pages with mlockall");

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => {
            info!("memory locked");
            Ok(true)
        }
        Err(e) => {
            // EPERM is common without CAP_IPC_LOCK
            if e == nix::errno::Errno::EPERM {
                warn!("mlockall failed with EPERM, page faults may occur during execution");
                Ok(false)
            } else {
                Err(PulseError::Config(format!("mlockall failed: {e}")))
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn lock_memory() -> PulseResult<bool> {
    warn!("mlockall not available on this platform");
    Ok(false)
}

/// Touch stack pages down to `size` bytes so they are resident before the
/// loop starts.
fn prefault_stack(size: usize) -> usize {
    const FRAME_SIZE: usize = 4096;

    #[inline(never)]
    fn touch(remaining: usize, depth: usize) -> usize {
        // Recursion depth bounds the faulted region to a sane default stack.
        if remaining < FRAME_SIZE || depth >= 1024 {
            return 0;
        }
        let mut frame = [0u8; FRAME_SIZE];
        // SAFETY: writes into our own stack frame.
        unsafe {
            std::ptr::write_volatile(frame.as_mut_ptr(), 0x55);
            std::ptr::write_volatile(frame.as_mut_ptr().add(FRAME_SIZE - 1), 0xAA);
        }
        std::hint::black_box(&frame);
        FRAME_SIZE + touch(remaining - FRAME_SIZE, depth + 1)
    }

    if size == 0 {
        return 0;
    }
    let faulted = touch(size, 0);
    debug!(faulted, "stack pre-fault complete");
    faulted
}

/// Set the scheduler policy and priority for the calling thread.
#[cfg(target_os = "linux")]
fn set_scheduler(policy: SchedPolicy, priority: u8) -> PulseResult<Option<u8>> {
    let linux_policy = match policy {
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::Rr => libc::SCHED_RR,
        SchedPolicy::Other => {
            debug!("using SCHED_OTHER (non-RT) scheduling");
            return Ok(None);
        }
    };

    // RT policies accept priorities 1-99
    let clamped = priority.clamp(1, 99);
    if clamped != priority {
        warn!(original = priority, clamped, "scheduler priority clamped");
    }

    let param = libc::sched_param {
        sched_priority: i32::from(clamped),
    };
    // SAFETY: pid 0 targets the calling thread; param is valid.
    let rc = unsafe { libc::sched_setscheduler(0, linux_policy, &param) };
    if rc == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!(
                "sched_setscheduler failed with EPERM, running without RT priority; \
                 grant CAP_SYS_NICE or run as root"
            );
            return Ok(None);
        }
        return Err(PulseError::Config(format!(
            "sched_setscheduler failed: {err}"
        )));
    }

    info!(?policy, priority = clamped, "real-time scheduler applied");
    Ok(Some(clamped))
}

#[cfg(not(target_os = "linux"))]
fn set_scheduler(policy: SchedPolicy, priority: u8) -> PulseResult<Option<u8>> {
    warn!(
        ?policy,
        priority, "real-time scheduling not available on this platform"
    );
    Ok(None)
}
