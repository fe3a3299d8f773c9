//! Cooperative signal handling
//!
//! OS signals are captured asynchronously into an atomic flag and turned into
//! an [`Interrupted`] error only when the owner polls [`SignalHandler::check`].
//! The signal-level handler does nothing but store the signal number.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Signal number used by [`Interrupter::interrupt`] when none is given
pub const SIGINT: i32 = 2;

/// A caught signal, surfaced at a polling point
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("caught signal {name} ({signal})")]
pub struct Interrupted {
    pub signal: i32,
    pub name: &'static str,
}

impl Interrupted {
    pub fn from_signal(signal: i32) -> Self {
        Self {
            signal,
            name: signal_name(signal),
        }
    }
}

/// Human readable name of the signals the handler listens to
pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        14 => "SIGALRM",
        15 => "SIGTERM",
        _ => "unknown signal",
    }
}

#[cfg(unix)]
fn caught_signals() -> [i32; 5] {
    use signal_hook::consts::signal::{SIGALRM, SIGHUP, SIGINT, SIGQUIT, SIGTERM};
    [SIGINT, SIGTERM, SIGHUP, SIGALRM, SIGQUIT]
}

/// Converts asynchronous signals into polled errors
///
/// Each handler owns its flag. Handlers created with [`SignalHandler::install`]
/// are registered with the OS and unregistered on drop; handlers created with
/// [`SignalHandler::detached`] only react to their [`Interrupter`].
#[derive(Debug)]
pub struct SignalHandler {
    pending: Arc<AtomicUsize>,
    #[cfg(unix)]
    ids: Vec<signal_hook::SigId>,
}

impl SignalHandler {
    /// Handler that is never triggered by the OS
    pub fn detached() -> Self {
        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            #[cfg(unix)]
            ids: Vec::new(),
        }
    }

    /// Register for SIGINT, SIGTERM, SIGHUP, SIGALRM and SIGQUIT
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        let mut handler = Self::detached();
        for signal in caught_signals() {
            let id = signal_hook::flag::register_usize(
                signal,
                Arc::clone(&handler.pending),
                signal as usize,
            )?;
            handler.ids.push(id);
        }
        log::debug!("signal handler installed for {:?}", caught_signals());
        Ok(handler)
    }

    /// Register for Ctrl+C
    ///
    /// Only one Ctrl+C handler may exist per process; later installs fall back
    /// to a detached handler.
    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        let handler = Self::detached();
        let pending = Arc::clone(&handler.pending);
        match ctrlc::set_handler(move || pending.store(SIGINT as usize, Ordering::SeqCst)) {
            Ok(()) => log::debug!("Ctrl+C handler installed"),
            Err(ctrlc::Error::MultipleHandlers) => {
                log::warn!("Ctrl+C handler already installed, this handler is detached")
            }
            Err(e) => return Err(io::Error::other(e.to_string())),
        }
        Ok(handler)
    }

    /// Handle that can raise a signal on this handler from any thread
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            pending: Arc::clone(&self.pending),
        }
    }

    /// Whether a signal is waiting to be consumed
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) != 0
    }

    /// Consume a pending signal
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] when a signal arrived since the previous check.
    pub fn check(&self) -> Result<(), Interrupted> {
        match self.pending.swap(0, Ordering::SeqCst) {
            0 => Ok(()),
            signal => Err(Interrupted::from_signal(signal as i32)),
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::detached()
    }
}

#[cfg(unix)]
impl Drop for SignalHandler {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Raises signals on a [`SignalHandler`] programmatically
#[derive(Debug, Clone)]
pub struct Interrupter {
    pending: Arc<AtomicUsize>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.raise(SIGINT);
    }

    pub fn raise(&self, signal: i32) {
        self.pending.store(signal.max(1) as usize, Ordering::SeqCst);
    }
}
