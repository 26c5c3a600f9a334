use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::logging;
use crate::supabase::AlertRecord;

/// One change notification from the alert table. Inserts carry the new row;
/// updates and deletes only announce that something changed — the controller
/// reconciles those with a full reload.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Insert(Box<AlertRecord>),
    Update,
    Delete,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<AlertRecord>,
    // Some notifier versions put the inserted row under "new".
    #[serde(default, rename = "new")]
    new_record: Option<AlertRecord>,
}

/// Parses one line of the notification stream. Unknown kinds and junk lines
/// yield `None`; inserts without a payload are dropped too (there is nothing
/// to render).
pub fn parse_line(line: &str) -> Option<ChangeEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let event: WireEvent = match serde_json::from_str(trimmed) {
        Ok(event) => event,
        Err(err) => {
            logging::warn(format!("realtime: undecodable event: {err}"));
            return None;
        }
    };
    match event.kind.to_ascii_uppercase().as_str() {
        "INSERT" => event
            .record
            .or(event.new_record)
            .map(|record| ChangeEvent::Insert(Box::new(record))),
        "UPDATE" => Some(ChangeEvent::Update),
        "DELETE" => Some(ChangeEvent::Delete),
        other => {
            logging::debug(format!("realtime: ignoring event kind {other}"));
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub changes_url: String,
    pub access_key: String,
    pub reconnect_delay: Duration,
    pub http_client: Option<HttpClient>,
}

/// Long-lived subscription to the backend change stream. Events arrive on
/// the returned channel; the worker reconnects after stream errors and exits
/// once `shutdown` flips the stop flag.
pub struct Bridge {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Bridge {
    pub fn connect(opts: Options) -> Result<(Self, Receiver<ChangeEvent>)> {
        let client = match opts.http_client.clone() {
            Some(client) => client,
            // No request timeout: the stream stays open between events.
            None => HttpClient::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .context("realtime: build http client")?,
        };

        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();
        let handle = thread::spawn(move || {
            run_stream(client, opts, tx, worker_stop);
        });

        Ok((
            Self {
                stop,
                handle: Some(handle),
            },
            rx,
        ))
    }

    /// Stops the worker. The reader may be parked in a blocking read; it is
    /// detached rather than joined and exits at the next line or reconnect
    /// tick.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.take();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn run_stream(
    client: HttpClient,
    opts: Options,
    tx: Sender<ChangeEvent>,
    stop: Arc<AtomicBool>,
) {
    let mut announced_failure = false;
    while !stop.load(Ordering::SeqCst) {
        match open_stream(&client, &opts) {
            Ok(response) => {
                announced_failure = false;
                logging::debug("realtime: change stream connected");
                let reader = BufReader::new(response);
                for line in reader.lines() {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    let line = match line {
                        Ok(line) => line,
                        Err(err) => {
                            logging::warn(format!("realtime: stream read failed: {err}"));
                            break;
                        }
                    };
                    if let Some(event) = parse_line(&line) {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                if !announced_failure {
                    logging::error(format!("realtime: connect failed: {err:#}"));
                    announced_failure = true;
                }
            }
        }

        if sleep_interruptibly(opts.reconnect_delay, &stop) {
            return;
        }
    }
}

fn open_stream(client: &HttpClient, opts: &Options) -> Result<reqwest::blocking::Response> {
    let key = HeaderValue::from_str(&opts.access_key).context("realtime: access key header")?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", opts.access_key))
        .context("realtime: bearer header")?;
    let response = client
        .get(&opts.changes_url)
        .header("apikey", key)
        .header(AUTHORIZATION, bearer)
        .header(ACCEPT, "application/x-ndjson")
        .send()
        .context("realtime: open change stream")?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("realtime: change stream rejected: {status}");
    }
    Ok(response)
}

fn sleep_interruptibly(total: Duration, stop: &AtomicBool) -> bool {
    let step = Duration::from_millis(200);
    let mut remaining = total;
    while !remaining.is_zero() {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        let chunk = remaining.min(step);
        thread::sleep(chunk);
        remaining -= chunk;
    }
    stop.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert_with_record_payload() {
        let line = r#"{"type":"INSERT","record":{"id":7,"contexto":"apagón nacional"}}"#;
        match parse_line(line) {
            Some(ChangeEvent::Insert(record)) => {
                assert_eq!(record.id, "7");
                assert_eq!(record.contexto.as_deref(), Some("apagón nacional"));
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn parses_insert_with_new_payload() {
        let line = r#"{"type":"insert","new":{"id":"a-9"}}"#;
        assert!(matches!(
            parse_line(line),
            Some(ChangeEvent::Insert(record)) if record.id == "a-9"
        ));
    }

    #[test]
    fn updates_and_deletes_carry_no_payload() {
        assert!(matches!(
            parse_line(r#"{"type":"UPDATE"}"#),
            Some(ChangeEvent::Update)
        ));
        assert!(matches!(
            parse_line(r#"{"type":"DELETE","record":{"id":1}}"#),
            Some(ChangeEvent::Delete)
        ));
    }

    #[test]
    fn junk_lines_are_dropped() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("not json").is_none());
        assert!(parse_line(r#"{"type":"TRUNCATE"}"#).is_none());
        // An insert without a row is unusable.
        assert!(parse_line(r#"{"type":"INSERT"}"#).is_none());
    }
}
