//! Companion command source
//!
//! A paired companion device (e.g. a watch) sends `(command, parameters)`
//! events. They arrive as newline-delimited JSON objects over a local socket
//! and are forwarded into a channel the manager consumes.

use crate::domain::commands::{ColorComponents, OutboundCommand};
use anyhow::Result;
use interprocess::local_socket::{
    traits::ListenerExt, GenericNamespaced, ListenerOptions, Stream as LocalStream, ToNsName,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::io::{BufRead, BufReader};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// One companion message, e.g. `{"command":"controlPad","tag":5}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionEvent {
    pub command: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl CompanionEvent {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Outbound commands this event maps to; empty when unknown or malformed
    pub fn to_commands(&self) -> Vec<OutboundCommand> {
        match self.command.as_str() {
            "controlPad" => match self.param_u64("tag").and_then(|t| u32::try_from(t).ok()) {
                Some(tag) => OutboundCommand::tap(tag).to_vec(),
                None => {
                    warn!("controlPad command without a valid tag: {:?}", self.params);
                    Vec::new()
                }
            },
            "color" => match self.param_u64("color").and_then(|c| u32::try_from(c).ok()) {
                Some(hex) if hex <= 0xFF_FF_FF => {
                    vec![OutboundCommand::ColorSet(ColorComponents::from_hex(hex))]
                }
                _ => {
                    warn!("color command without a valid color: {:?}", self.params);
                    Vec::new()
                }
            },
            other => {
                debug!("Companion command with unknown command: {}", other);
                Vec::new()
            }
        }
    }

    fn param_u64(&self, key: &str) -> Option<u64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Yields companion events until the source is exhausted
pub trait CommandSource: Send + 'static {
    fn next_event(&mut self) -> impl Future<Output = Option<CompanionEvent>> + Send;
}

impl CommandSource for mpsc::UnboundedReceiver<CompanionEvent> {
    fn next_event(&mut self) -> impl Future<Output = Option<CompanionEvent>> + Send {
        self.recv()
    }
}

/// Local-socket listener feeding companion events into a channel
pub struct CompanionBridge;

impl CompanionBridge {
    /// Bind `socket_name` and serve connections on a dedicated thread.
    ///
    /// Returns the receiving end to hand to the manager.
    pub fn spawn(
        socket_name: &str,
    ) -> Result<(mpsc::UnboundedReceiver<CompanionEvent>, JoinHandle<()>)> {
        let name = socket_name.to_ns_name::<GenericNamespaced>()?;
        let listener = ListenerOptions::new().name(name).create_sync()?;
        info!("Companion bridge listening on {}", socket_name);

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = std::thread::Builder::new()
            .name("companion-bridge".to_string())
            .spawn(move || {
                for conn in listener.incoming().filter_map(|x| x.ok()) {
                    debug!("Companion connected");
                    if let Err(e) = handle_connection(conn, &tx) {
                        error!("Companion connection error: {}", e);
                    }
                    if tx.is_closed() {
                        break;
                    }
                }
            })?;

        Ok((rx, handle))
    }
}

fn handle_connection(stream: LocalStream, tx: &mpsc::UnboundedSender<CompanionEvent>) -> Result<()> {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(event) => {
                if tx.send(event).is_err() {
                    break;
                }
            }
            None => warn!("Ignoring malformed companion message: {}", line),
        }
    }
    Ok(())
}

fn parse_line(line: &str) -> Option<CompanionEvent> {
    serde_json::from_str(line.trim()).ok()
}
