use log::error;
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg, Termios};
use std::os::unix::io::RawFd;

const STDIN_FILENO: RawFd = 0;

/// Puts stdin into raw (non-canonical, no-echo) mode for the duration of
/// the guard's lifetime, restoring the original settings on drop.
pub struct TerminalGuard {
    original: Termios,
}

impl TerminalGuard {
    pub fn enable_raw_mode() -> nix::Result<Self> {
        let original = tcgetattr(STDIN_FILENO)?;

        let mut raw = original.clone();
        raw.local_flags &= !(LocalFlags::ICANON | LocalFlags::ECHO);
        tcsetattr(STDIN_FILENO, SetArg::TCSANOW, &raw)?;

        Ok(Self { original })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(err) = tcsetattr(STDIN_FILENO, SetArg::TCSANOW, &self.original) {
            error!("failed to restore terminal settings: {}", err);
        }
    }
}
