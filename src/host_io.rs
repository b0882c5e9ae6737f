//! Host I/O adaptor: a non-blocking, internally-buffered stdin reader, an
//! unbuffered stdout writer, and the Racter-specific prompt-detection state
//! machine that gates interactive input delivery. `dustbox`'s own I/O is
//! SDL2-event-driven and has nothing to adapt here; this module is grounded
//! directly on `msdos_improved.c`'s `read_buffered_input()` and
//! `handle_prompt_detection()`, translated from `poll()`/`fcntl()` to the
//! equivalent `libc` calls.

use std::io::Write;

const INPUT_BUFFER_SIZE: usize = 256;

/// Puts fd 0 in non-blocking mode. Call once at startup; the host's stdin
/// is typically a pipe when running Racter-class programs, so this just
/// makes every `read()` return immediately instead of blocking the whole
/// interpreter.
pub fn set_stdin_nonblocking() {
    unsafe {
        let flags = libc::fcntl(0, libc::F_GETFL, 0);
        if flags >= 0 {
            libc::fcntl(0, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }
}

fn stdin_has_data() -> bool {
    let mut pfd = libc::pollfd {
        fd: 0,
        events: libc::POLLIN,
        revents: 0,
    };
    unsafe { libc::poll(&mut pfd, 1, 0) > 0 && (pfd.revents & libc::POLLIN) != 0 }
}

pub struct HostIo {
    buffer: [u8; INPUT_BUFFER_SIZE],
    read_pos: usize,
    fill_len: usize,

    /// rolling window of the last 4 bytes written to stdout
    prompt_window: [u8; 4],
    pub input_enabled: bool,
}

impl HostIo {
    pub fn new() -> Self {
        HostIo {
            buffer: [0u8; INPUT_BUFFER_SIZE],
            read_pos: 0,
            fill_len: 0,
            prompt_window: [0u8; 4],
            input_enabled: false,
        }
    }

    fn refill(&mut self) -> bool {
        if !stdin_has_data() {
            return false;
        }
        let n = unsafe { libc::read(0, self.buffer.as_mut_ptr() as *mut libc::c_void, self.buffer.len()) };
        if n > 0 {
            self.fill_len = n as usize;
            self.read_pos = 0;
            true
        } else {
            false
        }
    }

    /// Returns the next buffered byte, refilling from stdin (non-blocking)
    /// if the buffer is empty. Never blocks.
    pub fn try_read_byte(&mut self) -> Option<u8> {
        if self.read_pos >= self.fill_len && !self.refill() {
            return None;
        }
        let b = self.buffer[self.read_pos];
        self.read_pos += 1;
        Some(b)
    }

    /// Discards any buffered input and drains whatever is currently
    /// waiting on stdin.
    pub fn flush_input(&mut self) {
        self.read_pos = 0;
        self.fill_len = 0;
        while self.refill() {
            self.read_pos = self.fill_len;
        }
    }

    /// Writes a raw guest byte to stdout, flushes, and feeds the
    /// prompt-detection state machine. Used for genuine program output
    /// (AH=02/06/09, and whatever AH=0C redispatches into).
    pub fn write_byte(&mut self, b: u8) {
        self.write_byte_raw(b);
        self.feed_prompt_detector(b);
    }

    /// Writes a raw guest byte to stdout and flushes, without feeding the
    /// prompt-detection state machine. Used for AH=01's input echo, which
    /// `msdos_improved.c` sends through a bare `putchar()` that bypasses
    /// detection entirely — feeding it here would let an echoed `\r` in the
    /// middle of guest-typed input spuriously close the gate.
    pub fn write_byte_raw(&mut self, b: u8) {
        let mut out = std::io::stdout();
        let _ = out.write_all(&[b]);
        let _ = out.flush();
    }

    fn feed_prompt_detector(&mut self, b: u8) {
        self.prompt_window[0] = self.prompt_window[1];
        self.prompt_window[1] = self.prompt_window[2];
        self.prompt_window[2] = self.prompt_window[3];
        self.prompt_window[3] = b;

        if self.prompt_window[1] == b'\r' && self.prompt_window[2] == b'\n' && self.prompt_window[3] == b'>' {
            self.input_enabled = true;
            let _ = std::io::stdout().flush();
        } else if b == b'\r' {
            self.input_enabled = false;
        }
    }
}
