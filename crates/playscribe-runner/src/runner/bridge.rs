//! JSON-RPC over a child process's stdio, with per-call timeouts.
//!
//! Requests carry ids counting up from 1. A background task reads response
//! lines and hands each to the caller waiting on that id. Frames that don't
//! parse, or whose id nobody is waiting on, are dropped. A call that times
//! out is settled for good: its id is remembered and a late answer for it is
//! discarded.

use std::collections::{BTreeSet, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, info, warn};

use playscribe_driver::config::HEADLESS_ENV;
use playscribe_driver::{ToolDescriptor, ToolResult, READY_MARKER};

use crate::config::DriverCommand;
use crate::{Error, Result};

/// MCP protocol revision sent in `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Timed-out ids remembered at once; the oldest are forgotten first.
const MAX_SETTLED: usize = 1024;

#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Frame {
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

struct Waiting {
    method: String,
    tx: oneshot::Sender<Result<Value>>,
}

#[derive(Default)]
struct Pending {
    waiting: HashMap<u64, Waiting>,
    /// Ids rejected by timeout; a response for one of these is dropped.
    settled: BTreeSet<u64>,
}

impl Pending {
    /// Stop waiting on `id` after a timeout. Returns false when the response
    /// already arrived, in which case nothing is remembered.
    fn settle(&mut self, id: u64) -> bool {
        if self.waiting.remove(&id).is_none() {
            return false;
        }
        self.settled.insert(id);
        while self.settled.len() > MAX_SETTLED {
            self.settled.pop_first();
        }
        true
    }
}

/// Timeouts for one bridge.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    pub call_timeout: Duration,
    pub ready_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&DriverCommand> for BridgeConfig {
    fn from(cmd: &DriverCommand) -> Self {
        Self {
            call_timeout: Duration::from_millis(cmd.call_timeout_ms),
            ready_timeout: Duration::from_millis(cmd.ready_timeout_ms),
        }
    }
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Client side of the driver protocol.
pub struct Bridge {
    writer: Mutex<Writer>,
    next_id: AtomicU64,
    pending: Arc<Mutex<Pending>>,
    ready: watch::Receiver<bool>,
    closed: Arc<AtomicBool>,
    config: BridgeConfig,
    child: Mutex<Option<Child>>,
}

impl Bridge {
    /// Start the driver process. Call [`Bridge::connect`] before anything else.
    pub fn spawn(cmd: &DriverCommand, headless: bool) -> Result<Self> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(&cmd.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if headless {
            command.env(HEADLESS_ENV, "1");
        }

        let mut child = command.spawn().map_err(|e| {
            Error::Transport(format!("failed to spawn '{}': {}", cmd.program, e))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("driver has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("driver has no stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Transport("driver has no stderr".into()))?;
        info!(program = %cmd.program, pid = ?child.id(), "driver started");

        Ok(Self {
            child: Mutex::new(Some(child)),
            ..Self::from_streams(stdin, stdout, stderr, BridgeConfig::from(cmd))
        })
    }

    /// Attach to already-open streams: requests go to `writer`, responses
    /// come from `reader`, and `diagnostics` is watched for the startup line.
    pub fn from_streams<W, R, D>(writer: W, reader: R, diagnostics: D, config: BridgeConfig) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
        D: AsyncRead + Send + Unpin + 'static,
    {
        let pending = Arc::new(Mutex::new(Pending::default()));
        let closed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = watch::channel(false);

        tokio::spawn(read_frames(reader, pending.clone(), closed.clone()));
        tokio::spawn(watch_diagnostics(diagnostics, ready_tx));

        Self {
            writer: Mutex::new(Box::new(writer)),
            next_id: AtomicU64::new(1),
            pending,
            ready: ready_rx,
            closed,
            config,
            child: Mutex::new(None),
        }
    }

    /// Whether the startup line was seen and the driver's output is open.
    pub fn is_connected(&self) -> bool {
        *self.ready.borrow() && !self.closed.load(Ordering::SeqCst)
    }

    /// Wait for the driver's startup line.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut ready = self.ready.clone();
        let timeout = self.config.ready_timeout;
        let waited = tokio::time::timeout(timeout, ready.wait_for(|r| *r))
            .await
            .map(|r| r.map(|_| ()));
        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::Transport(
                "driver exited before it was ready".into(),
            )),
            Err(_) => Err(Error::Transport(format!(
                "driver not ready after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Wait for readiness, then run the MCP initialize handshake.
    pub async fn connect(&self) -> Result<Value> {
        self.wait_ready().await?;
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "playscribe",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let server = self.request("initialize", Some(params)).await?;
        self.notify("notifications/initialized").await?;
        info!(server = %server["serverInfo"]["name"], "connected to driver");
        Ok(server)
    }

    /// Send a request and wait for its response or the call timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.waiting.insert(
            id,
            Waiting {
                method: method.to_string(),
                tx,
            },
        );

        let frame = Request {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        debug!(id, method, "→ request");
        if let Err(e) = self.send(&frame).await {
            self.pending.lock().await.waiting.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Transport(format!(
                "driver dropped request {} ({})",
                id, method
            ))),
            Err(_) => {
                if !self.pending.lock().await.settle(id) {
                    debug!(id, method, "response arrived as the call timed out");
                }
                warn!(id, method, "request timed out");
                Err(Error::Timeout {
                    id,
                    method: method.to_string(),
                    timeout_ms: self.config.call_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        self.send(&json!({ "jsonrpc": "2.0", "method": method })).await
    }

    async fn send<T: Serialize>(&self, frame: &T) -> Result<()> {
        let mut line = serde_json::to_string(frame)?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Call a tool. An error envelope becomes [`Error::Tool`].
    pub async fn invoke(&self, tool: &str, args: Value) -> Result<ToolResult> {
        let value = self
            .request("tools/call", Some(json!({ "name": tool, "arguments": args })))
            .await?;
        let result: ToolResult = serde_json::from_value(value)?;
        if result.is_error {
            return Err(Error::Tool(
                result
                    .first_text()
                    .unwrap_or_else(|| format!("{} returned an error", tool)),
            ));
        }
        Ok(result)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let value = self.request("tools/list", None).await?;
        let tools = value.get("tools").cloned().unwrap_or(Value::Array(vec![]));
        Ok(serde_json::from_value(tools)?)
    }

    /// Close the browser, then stop the driver process.
    pub async fn shutdown(&self) -> Result<()> {
        if self.is_connected() {
            if let Err(e) = self.invoke("close_browser", json!({})).await {
                warn!(error = %e, "close_browser failed during shutdown");
            }
        }
        if let Some(mut child) = self.child.lock().await.take() {
            child.kill().await?;
            info!("driver stopped");
        }
        Ok(())
    }
}

/// Read up to the next newline into `buf`, without the line ending.
/// Returns false at end of stream. Bytes are not required to be UTF-8.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = reader.read_until(b'\n', buf).await?;
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(n > 0)
}

async fn read_frames<R>(reader: R, pending: Arc<Mutex<Pending>>, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        match read_line(&mut reader, &mut buf).await {
            Ok(true) if buf.iter().all(u8::is_ascii_whitespace) => {}
            Ok(true) => deliver(&pending, &buf).await,
            Ok(false) => break,
            Err(e) => {
                warn!(error = %e, "driver read error");
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    let mut pending = pending.lock().await;
    for (id, waiting) in pending.waiting.drain() {
        let _ = waiting.tx.send(Err(Error::Transport(format!(
            "driver output closed before answering {} ({})",
            id, waiting.method
        ))));
    }
    debug!("driver output closed");
}

async fn deliver(pending: &Mutex<Pending>, line: &[u8]) {
    let frame: Frame = match serde_json::from_slice(line) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "discarding malformed frame");
            return;
        }
    };
    let Some(id) = frame.id else {
        debug!("ignoring notification");
        return;
    };

    let mut pending = pending.lock().await;
    let Some(waiting) = pending.waiting.remove(&id) else {
        if pending.settled.remove(&id) {
            debug!(id, "discarding late response");
        } else {
            debug!(id, "discarding unmatched response");
        }
        return;
    };
    let result = match frame.error {
        Some(err) => Err(Error::Remote {
            code: err.code,
            message: err.message,
        }),
        None => Ok(frame.result.unwrap_or(Value::Null)),
    };
    debug!(id, method = %waiting.method, "← response");
    let _ = waiting.tx.send(result);
}

async fn watch_diagnostics<D>(stream: D, ready: watch::Sender<bool>)
where
    D: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    while let Ok(true) = read_line(&mut reader, &mut buf).await {
        let line = String::from_utf8_lossy(&buf);
        let seen = *ready.borrow();
        if !seen && line.contains(READY_MARKER) {
            ready.send_replace(true);
            debug!("driver ready");
        } else {
            debug!(target: "playscribe::driver", "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting_on(pending: &mut Pending, id: u64) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        pending.waiting.insert(
            id,
            Waiting {
                method: "ping".into(),
                tx,
            },
        );
        rx
    }

    #[test]
    fn test_settle_only_remembers_waiting_ids() {
        let mut pending = Pending::default();
        let _rx = waiting_on(&mut pending, 1);

        assert!(pending.settle(1));
        assert!(pending.waiting.is_empty());
        assert!(pending.settled.contains(&1));

        // Already answered: nothing to remember.
        assert!(!pending.settle(2));
        assert!(!pending.settled.contains(&2));
    }

    #[test]
    fn test_settled_ids_are_capped() {
        let mut pending = Pending::default();
        let total = MAX_SETTLED as u64 + 10;
        for id in 1..=total {
            let _rx = waiting_on(&mut pending, id);
            pending.settle(id);
        }
        assert_eq!(pending.settled.len(), MAX_SETTLED);
        assert!(!pending.settled.contains(&1));
        assert!(!pending.settled.contains(&10));
        assert!(pending.settled.contains(&11));
        assert!(pending.settled.contains(&total));
    }

    #[tokio::test]
    async fn test_read_line_keeps_invalid_utf8() {
        let mut reader = BufReader::new(&b"\xff\xfe junk\r\n{}\n"[..]);
        let mut buf = Vec::new();
        assert!(read_line(&mut reader, &mut buf).await.unwrap());
        assert_eq!(buf, b"\xff\xfe junk");
        assert!(read_line(&mut reader, &mut buf).await.unwrap());
        assert_eq!(buf, b"{}");
        assert!(!read_line(&mut reader, &mut buf).await.unwrap());
    }
}
