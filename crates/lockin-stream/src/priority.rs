//! Real-time scheduling for the acquisition thread

use crate::config::RealtimeConfig;
use std::io;

/// Move the calling thread to `SCHED_FIFO` at the configured priority, then
/// apply the configured nice value.
///
/// Usually needs `CAP_SYS_NICE`. Callers treat failure as a warning.
#[cfg(target_os = "linux")]
pub fn elevate_current_thread(config: &RealtimeConfig) -> io::Result<()> {
    let param = libc::sched_param {
        sched_priority: config.priority,
    };
    // SAFETY: `param` is a valid sched_param for the duration of the call and
    // pid 0 names the calling thread.
    let result = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: plain syscall on the calling thread.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, config.nice) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn elevate_current_thread(_config: &RealtimeConfig) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SCHED_FIFO is only requested on Linux",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_fails_cleanly_or_succeeds() {
        // Unprivileged runs get EPERM; either way the call must return
        let config = RealtimeConfig::default();
        let handle = std::thread::spawn(move || elevate_current_thread(&config).is_ok());
        let _ = handle.join().unwrap();
    }
}
