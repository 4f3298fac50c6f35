use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

/// Small wrapper around stdout/stderr printing to provide consistent, colored
/// user-facing messages. Colors and the status line are enabled only when
/// output is a TTY.
///
/// Every line printed here (and every tracing line, through [`StatusSafeStdout`])
/// first clears the in-progress status line while holding [`STATUS`], so a
/// warning never lands in the middle of a status update.
fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

/// Whether a status line is currently drawn.
static STATUS: Mutex<bool> = Mutex::new(false);

fn lock_status() -> MutexGuard<'static, bool> {
    STATUS.lock().unwrap_or_else(|e| e.into_inner())
}

fn clear_locked(shown: &mut bool) {
    if *shown {
        let mut out = io::stdout();
        let _ = write!(out, "\r\x1b[2K");
        let _ = out.flush();
        *shown = false;
    }
}

/// Replace the transient status line (TTY only).
pub fn status(msg: &str) {
    if !is_tty() {
        return;
    }
    let mut shown = lock_status();
    let mut out = io::stdout();
    let _ = write!(out, "\r\x1b[2K{}", msg.dimmed());
    let _ = out.flush();
    *shown = true;
}

/// Erase the status line if one is drawn.
pub fn clear_status() {
    clear_locked(&mut lock_status());
}

pub fn print_info(msg: &str) {
    let mut shown = lock_status();
    clear_locked(&mut shown);
    if is_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {}", msg);
    }
}

pub fn print_warn(msg: &str) {
    let mut shown = lock_status();
    clear_locked(&mut shown);
    if is_tty() {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {}", msg);
    }
}

pub fn print_error(msg: &str) {
    let mut shown = lock_status();
    clear_locked(&mut shown);
    if is_tty() {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {}", msg);
    }
}

pub fn print_success(msg: &str) {
    let mut shown = lock_status();
    clear_locked(&mut shown);
    if is_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {}", msg);
    }
}

/// Stdout writer for tracing layers that clears the status line before each event.
pub struct StatusSafeStdout;

/// One event's worth of output; holds the status lock until dropped.
pub struct StatusSafeWriter {
    _guard: MutexGuard<'static, bool>,
    out: io::Stdout,
}

impl Write for StatusSafeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<'a> MakeWriter<'a> for StatusSafeStdout {
    type Writer = StatusSafeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let mut guard = lock_status();
        clear_locked(&mut guard);
        StatusSafeWriter { _guard: guard, out: io::stdout() }
    }
}
