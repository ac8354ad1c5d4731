//! Session logger: all log output goes to a single file in the OS data directory.
//!
//! The file is **truncated at each launch**, so it only ever contains the
//! most recent session.
//!
//! Log location (`dirs::data_dir()`):
//!   Windows:  `%APPDATA%\RenderAI\renderai.log`
//!   Linux:    `~/.local/share/RenderAI/renderai.log`
//!   macOS:    `~/Library/Application Support/RenderAI/renderai.log`
//!
//! Anywhere in the crate use the `log_info!` / `log_warn!` / `log_err!`
//! macros; they forward to `tracing`, so library code logs the same way
//! whether or not a subscriber has been installed (tests run without one).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Path to the current session log file, once `init` has opened it.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        ::tracing::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        ::tracing::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        ::tracing::error!($($arg)*)
    };
}

/// Shared handle so the panic hook and the subscriber write the same file.
#[derive(Clone)]
struct SessionFile(Arc<Mutex<File>>);

impl Write for SessionFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut f) => f.write(buf),
            // A poisoned lock only means a writer panicked mid-line.
            Err(poisoned) => poisoned.into_inner().write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut f) => f.flush(),
            Err(poisoned) => poisoned.into_inner().flush(),
        }
    }
}

/// Initialise logging. Call once, before anything logs.
///
/// * Creates (or truncates) the session log file.
/// * `echo_stderr` also mirrors events to the terminal (headless mode).
/// * `verbose` lowers the default level from INFO to DEBUG; `RUST_LOG`
///   overrides both.
/// * Installs a panic hook that writes the panic to the log before the
///   default handler runs.
pub fn init(echo_stderr: bool, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = open_session_file();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false);

    // try_init: a second call (or a test harness subscriber) is not an error.
    let installed = match (&file, echo_stderr) {
        (Some(f), true) => {
            let f = f.clone();
            builder
                .with_writer((move || f.clone()).and(std::io::stderr))
                .try_init()
        }
        (Some(f), false) => {
            let f = f.clone();
            builder.with_writer(move || f.clone()).try_init()
        }
        (None, _) => builder.with_writer(std::io::stderr).try_init(),
    };
    if installed.is_err() {
        return;
    }

    log_info!(
        "=== RenderAI {} session started {} ===",
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(path) = log_path() {
        log_info!("Log file: {}", path.display());
    }

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(mut f) = file.clone() {
            let _ = writeln!(f, "{} PANIC {}", chrono::Local::now().format("%H:%M:%S"), info);
        }
        prev(info);
    }));
}

fn open_session_file() -> Option<SessionFile> {
    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => {
            let _ = LOG_PATH.set(path);
            Some(SessionFile(Arc::new(Mutex::new(f))))
        }
        Err(e) => {
            // Not fatal: the session just runs without a log file.
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    }
}

fn log_file_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("RenderAI")
        .join("renderai.log")
}
