// Terminal control for the interactive quit affordance.
//
// The relay binary watches the controlling terminal for a `q`/`Q`
// keypress. That needs two things on Unix: canonical mode and echo off
// (so single keystrokes arrive immediately and silently), and a
// non-blocking way to ask "is a key waiting?". Both go through `libc`
// (termios + `poll`), mirroring how the original relay toggled its
// terminal. On other platforms these are no-ops and the binary falls
// back to Ctrl+C alone.

#[cfg(unix)]
use std::io::Read;

/// Guard that holds the terminal in raw(ish) mode; the saved settings are
/// restored on drop. `enable` returns `None` when stdin is not a terminal
/// (e.g. running under a pipe), in which case nothing is changed.
#[cfg(unix)]
pub struct RawMode {
    saved: libc::termios,
}

#[cfg(unix)]
impl RawMode {
    pub fn enable() -> Option<Self> {
        unsafe {
            let mut saved: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut saved) != 0 {
                return None;
            }
            let mut raw = saved;
            raw.c_lflag &= !(libc::ICANON | libc::ECHO);
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) != 0 {
                return None;
            }
            Some(Self { saved })
        }
    }
}

#[cfg(unix)]
impl Drop for RawMode {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.saved);
        }
    }
}

/// Return a pending keypress from stdin without blocking, if any.
#[cfg(unix)]
pub fn key_pressed() -> Option<u8> {
    let mut fds = libc::pollfd {
        fd: libc::STDIN_FILENO,
        events: libc::POLLIN,
        revents: 0,
    };
    let ready = unsafe { libc::poll(&mut fds, 1, 0) };
    if ready <= 0 || fds.revents & libc::POLLIN == 0 {
        return None;
    }
    let mut byte = [0u8; 1];
    match std::io::stdin().read(&mut byte) {
        Ok(1) => Some(byte[0]),
        _ => None,
    }
}

#[cfg(not(unix))]
pub struct RawMode;

#[cfg(not(unix))]
impl RawMode {
    pub fn enable() -> Option<Self> {
        None
    }
}

#[cfg(not(unix))]
pub fn key_pressed() -> Option<u8> {
    None
}
