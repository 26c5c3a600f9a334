use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

pub const DEBUG_ENV: &str = "MEDIOS_DEBUG";
pub const LOG_FILE_ENV: &str = "MEDIOS_LOG_FILE";

static DEBUG: OnceCell<bool> = OnceCell::new();
static WRITER: OnceCell<Option<Mutex<File>>> = OnceCell::new();

/// Wires the diagnostics sink once at startup. Debug/warn lines are dropped
/// unless the debug flag (config or `MEDIOS_DEBUG`) is set; errors always
/// land in the log file, or on stderr when no file is configured.
pub fn init(debug: bool, file: Option<&Path>) {
    let _ = DEBUG.set(debug || env_flag(DEBUG_ENV));
    let path = file
        .map(|path| path.to_path_buf())
        .or_else(|| std::env::var(LOG_FILE_ENV).ok().map(Into::into));
    let _ = WRITER.set(path.and_then(|path| {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(Mutex::new)
            .ok()
    }));
}

fn debug_enabled() -> bool {
    *DEBUG.get_or_init(|| env_flag(DEBUG_ENV))
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|val| {
            let trimmed = val.trim();
            !(trimmed.is_empty()
                || trimmed.eq_ignore_ascii_case("0")
                || trimmed.eq_ignore_ascii_case("false")
                || trimmed.eq_ignore_ascii_case("no")
                || trimmed.eq_ignore_ascii_case("off"))
        })
        .unwrap_or(false)
}

pub fn debug(message: impl AsRef<str>) {
    if debug_enabled() {
        write_line("debug", message.as_ref());
    }
}

pub fn warn(message: impl AsRef<str>) {
    if debug_enabled() {
        write_line("warn", message.as_ref());
    }
}

pub fn error(message: impl AsRef<str>) {
    write_line("error", message.as_ref());
}

fn write_line(level: &str, message: &str) {
    let line = format!("{} [{level}] {message}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"));
    if let Some(Some(writer)) = WRITER.get() {
        let mut file = writer.lock();
        let _ = writeln!(file, "{line}");
        return;
    }
    // No sink configured; stderr is only safe outside the alternate screen,
    // so this mostly matters for startup and shutdown failures.
    eprintln!("{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_flag_parsing() {
        std::env::set_var("MEDIOS_TEST_FLAG", "1");
        assert!(env_flag("MEDIOS_TEST_FLAG"));
        std::env::set_var("MEDIOS_TEST_FLAG", "off");
        assert!(!env_flag("MEDIOS_TEST_FLAG"));
        std::env::remove_var("MEDIOS_TEST_FLAG");
        assert!(!env_flag("MEDIOS_TEST_FLAG"));
    }
}
