use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use serde_json::json;

#[cfg(unix)]
use rand::{distributions::Alphanumeric, Rng};
#[cfg(unix)]
use std::io::Write;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::logging;

pub const URL_PLACEHOLDER: &str = "%URL%";

#[derive(Clone, Copy)]
pub enum PlayerCommand {
    Pause,
    Rewind,
}

pub struct LaunchOptions<'a> {
    /// Player command template from the config; `%URL%` is replaced with the
    /// clip URL, or the URL is appended when no placeholder is present.
    pub command: &'a [String],
    pub url: &'a str,
    pub title: &'a str,
}

/// A running external player for one alert clip. Collapsing or hiding the
/// owning card pauses and rewinds it over the player's IPC socket.
pub struct Session {
    kill_tx: Sender<()>,
    status_rx: Receiver<Result<ExitStatus>>,
    handle: Option<thread::JoinHandle<()>>,
    ipc_path: Option<Arc<String>>,
}

impl Session {
    fn finalize(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Non-blocking exit check; `Some` once the player has terminated.
    pub fn try_status(&mut self) -> Option<Result<ExitStatus>> {
        match self.status_rx.try_recv() {
            Ok(res) => {
                self.finalize();
                Some(res)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finalize();
                Some(Err(anyhow!("player session closed unexpectedly")))
            }
        }
    }

    pub fn stop_blocking(mut self) -> Option<Result<ExitStatus>> {
        let _ = self.kill_tx.send(());
        let res = self.status_rx.recv().ok();
        self.finalize();
        res
    }

    pub fn controls_supported(&self) -> bool {
        self.ipc_path.is_some()
    }

    pub fn pause_and_rewind(&self) -> Result<()> {
        self.send_command(PlayerCommand::Pause)?;
        self.send_command(PlayerCommand::Rewind)
    }

    /// Current playback position in seconds, asked over the IPC socket.
    /// Falls back to `None` when the player has no position yet.
    pub fn query_time_pos(&self) -> Option<f64> {
        let path = self.ipc_path.as_ref()?;
        let request = json!({ "command": ["get_property", "time-pos"], "request_id": 1 });
        let serialized = serde_json::to_string(&request).ok()?;
        let reply = query_ipc_line(path, &serialized)?;
        let parsed: serde_json::Value = serde_json::from_str(&reply).ok()?;
        if parsed.get("error").and_then(|e| e.as_str()) != Some("success") {
            return None;
        }
        parsed.get("data").and_then(|data| data.as_f64())
    }

    pub fn send_command(&self, command: PlayerCommand) -> Result<()> {
        let Some(path) = &self.ipc_path else {
            return Err(anyhow!("player controls are not supported on this platform"));
        };
        let payload = json!({ "command": command_payload(command) });
        let serialized = serde_json::to_string(&payload).context("serialize player command")?;
        send_ipc_line(path, &serialized)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.kill_tx.send(());
            let _ = self.status_rx.recv().ok();
            self.finalize();
        }
    }
}

pub fn spawn(opts: LaunchOptions<'_>) -> Result<Session> {
    if opts.url.trim().is_empty() {
        return Err(anyhow!("video URL missing"));
    }
    if opts.command.is_empty() {
        return Err(anyhow!("player command not configured"));
    }

    let mut args = expand_command(opts.command, opts.url);
    let program = args.remove(0);
    let ipc_path = if program.contains("mpv") {
        unique_ipc_path()
    } else {
        None
    };
    if let Some(path) = &ipc_path {
        args.push(format!("--input-ipc-server={path}"));
        args.push("--really-quiet".to_string());
        if !opts.title.trim().is_empty() {
            args.push(format!("--force-media-title={}", opts.title.trim()));
        }
    }
    logging::debug(format!("player: launching {program} {args:?}"));

    let (kill_tx, kill_rx) = bounded::<()>(1);
    let (status_tx, status_rx) = bounded::<Result<ExitStatus>>(1);
    let ipc_for_session = ipc_path.clone();
    let url = opts.url.to_string();

    let handle = thread::spawn(move || {
        let ipc_cleanup = ipc_path.clone();
        let result = (|| -> Result<ExitStatus> {
            let mut child = Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .with_context(|| format!("launch {program} to play {url}"))?;

            loop {
                if kill_rx.try_recv().is_ok() {
                    let _ = child.kill();
                    return child.wait().context("wait for player after stop request");
                }
                match child.try_wait() {
                    Ok(Some(status)) => return Ok(status),
                    Ok(None) => thread::sleep(Duration::from_millis(30)),
                    Err(err) => return Err(anyhow!(err)).context("poll player status"),
                }
            }
        })();
        if let Some(path) = ipc_cleanup {
            cleanup_ipc_path(&path);
        }
        let _ = status_tx.send(result);
    });

    Ok(Session {
        kill_tx,
        status_rx,
        handle: Some(handle),
        ipc_path: ipc_for_session.map(Arc::new),
    })
}

fn expand_command(template: &[String], url: &str) -> Vec<String> {
    let mut substituted = false;
    let mut args: Vec<String> = template
        .iter()
        .map(|part| {
            if part.contains(URL_PLACEHOLDER) {
                substituted = true;
                part.replace(URL_PLACEHOLDER, url)
            } else {
                part.clone()
            }
        })
        .collect();
    if !substituted {
        args.push(url.to_string());
    }
    args
}

fn command_payload(command: PlayerCommand) -> serde_json::Value {
    match command {
        PlayerCommand::Pause => json!(["set_property", "pause", true]),
        PlayerCommand::Rewind => json!(["seek", 0, "absolute"]),
    }
}

#[cfg(unix)]
fn send_ipc_line(path: &str, serialized: &str) -> Result<()> {
    let mut stream =
        UnixStream::connect(path).with_context(|| format!("connect to player IPC socket {path}"))?;
    stream
        .write_all(serialized.as_bytes())
        .context("write player IPC command")?;
    stream
        .write_all(b"\n")
        .context("write player IPC terminator")?;
    Ok(())
}

#[cfg(not(unix))]
fn send_ipc_line(_path: &str, _serialized: &str) -> Result<()> {
    Err(anyhow!("player controls are not supported on this platform"))
}

#[cfg(unix)]
fn query_ipc_line(path: &str, serialized: &str) -> Option<String> {
    use std::io::{BufRead, BufReader};

    let mut stream = UnixStream::connect(path).ok()?;
    stream
        .set_read_timeout(Some(Duration::from_millis(500)))
        .ok()?;
    stream.write_all(serialized.as_bytes()).ok()?;
    stream.write_all(b"\n").ok()?;

    // mpv interleaves events on the socket; take the first reply that
    // carries our request id.
    let reader = BufReader::new(stream);
    for line in reader.lines().take(16) {
        let line = line.ok()?;
        if line.contains("\"request_id\":1") {
            return Some(line);
        }
    }
    None
}

#[cfg(not(unix))]
fn query_ipc_line(_path: &str, _serialized: &str) -> Option<String> {
    None
}

#[cfg(unix)]
fn unique_ipc_path() -> Option<String> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let mut path = std::env::temp_dir();
    path.push(format!("medios-mpv-{}-{suffix}.sock", std::process::id()));
    Some(path.to_string_lossy().to_string())
}

#[cfg(not(unix))]
fn unique_ipc_path() -> Option<String> {
    None
}

#[cfg(unix)]
fn cleanup_ipc_path(path: &str) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            logging::debug(format!("player: failed to remove ipc path {path}: {err}"));
        }
    }
}

#[cfg(not(unix))]
fn cleanup_ipc_path(_path: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_substitution() {
        let template = vec!["mpv".to_string(), "--fs".to_string(), "%URL%".to_string()];
        let args = expand_command(&template, "https://cdn.example.com/clip.mp4");
        assert_eq!(
            args,
            vec!["mpv", "--fs", "https://cdn.example.com/clip.mp4"]
        );
    }

    #[test]
    fn url_appended_without_placeholder() {
        let template = vec!["vlc".to_string()];
        let args = expand_command(&template, "https://cdn.example.com/clip.mp4");
        assert_eq!(args, vec!["vlc", "https://cdn.example.com/clip.mp4"]);
    }

    #[test]
    fn pause_and_rewind_payloads() {
        assert_eq!(
            command_payload(PlayerCommand::Pause),
            json!(["set_property", "pause", true])
        );
        assert_eq!(
            command_payload(PlayerCommand::Rewind),
            json!(["seek", 0, "absolute"])
        );
    }

    #[test]
    fn spawn_rejects_empty_inputs() {
        let command = vec!["mpv".to_string()];
        assert!(spawn(LaunchOptions {
            command: &command,
            url: "  ",
            title: "x",
        })
        .is_err());
        assert!(spawn(LaunchOptions {
            command: &[],
            url: "https://cdn.example.com/clip.mp4",
            title: "x",
        })
        .is_err());
    }
}
