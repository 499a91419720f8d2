//! Signal handling for clean daemon shutdown.
//!
//! SIGINT, SIGTERM, SIGHUP, and SIGALRM all take the same path: an
//! async-signal-safe handler sets a static atomic flag, and a small poll
//! thread forwards it to the shared context as a cooperative shutdown
//! request. The driver checks that request at the start of each cycle, so
//! no thread-cancellation primitive is ever invoked from a handler.

use pulsegen_runtime::PulseContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Set from the signal handlers; the only state they touch.
static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);

/// Register handlers for the termination signals and start the thread that
/// forwards them to `ctx`.
///
/// # Errors
///
/// Returns an error if the forwarding thread cannot be spawned.
pub fn install(ctx: Arc<PulseContext>) -> std::io::Result<()> {
    use std::os::raw::c_int;

    extern "C" fn on_terminate(_: c_int) {
        SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
    }

    // SAFETY: the handler only stores to an atomic, which is
    // async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, on_terminate as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_terminate as libc::sighandler_t);
        libc::signal(libc::SIGHUP, on_terminate as libc::sighandler_t);
        libc::signal(libc::SIGALRM, on_terminate as libc::sighandler_t);
    }

    std::thread::Builder::new()
        .name("pulsegen-signals".into())
        .spawn(move || {
            loop {
                if SHUTDOWN_FLAG.swap(false, Ordering::Relaxed) {
                    info!("termination signal received, requesting shutdown");
                    ctx.request_shutdown();
                    break;
                }
                if ctx.shutdown_requested() {
                    // Shutdown initiated elsewhere; nothing left to forward.
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            debug!("signal forwarder exiting");
        })?;

    debug!("signal handlers registered");
    Ok(())
}
