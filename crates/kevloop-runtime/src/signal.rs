//! Signal disposition helpers
//!
//! Signals delivered through the event queue must not also run the default
//! action, so their disposition is switched to ignore once they are watched.

use std::io;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal as NixSignal};

use kevloop_core::Signal;

/// Set `signal`'s disposition to `SIG_IGN`.
pub fn ignore(signal: Signal) -> io::Result<()> {
    let sig = NixSignal::try_from(signal).map_err(io::Error::from)?;
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: SIG_IGN installs no handler code.
    unsafe { sigaction(sig, &action) }
        .map(|_| ())
        .map_err(io::Error::from)
}
