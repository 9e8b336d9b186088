//! IPC server: Unix socket listener + per-client state + message framing.
//!
//! Messages are length-prefixed: a 4-byte big-endian payload length followed
//! by a UTF-8 s-expression.  Responses go back to the requesting client;
//! tracker events are broadcast to every client that completed `hello`.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Instant;

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use tracing::{debug, error, info, warn};

use super::dispatch;
use crate::state::DaemonState;

/// Maximum message payload size (1 MiB).
const MAX_MESSAGE_SIZE: u32 = 1_048_576;

/// Maximum write buffer before dropping old events (64 KiB).
const MAX_WRITE_BUFFER: usize = 65_536;

/// Default rate limit: messages per second per client.
pub const DEFAULT_RATE_LIMIT: u32 = 1000;

/// Rate limit window duration in seconds.
const RATE_LIMIT_WINDOW_SECS: u64 = 1;

/// Per-client rate limiter.
pub struct RateLimiter {
    window_start: Instant,
    message_count: u32,
    pub max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self {
            window_start: Instant::now(),
            message_count: 0,
            max_per_second,
        }
    }

    /// Count a message against the current window.  False once the window
    /// is over its limit.
    fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.window_start);
        if elapsed.as_secs() >= RATE_LIMIT_WINDOW_SECS {
            self.window_start = now;
            self.message_count = 1;
            true
        } else {
            self.message_count += 1;
            self.message_count <= self.max_per_second
        }
    }
}

/// Read the peer UID from a Unix socket using SO_PEERCRED (Linux), or
/// return None on unsupported platforms.
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    #[cfg(target_os = "linux")]
    {
        let fd = stream.as_raw_fd();
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if ret == 0 {
            Some(cred.uid)
        } else {
            None
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = stream;
        None
    }
}

/// Per-client IPC connection state.
pub struct IpcClient {
    pub stream: UnixStream,
    pub read_buf: Vec<u8>,
    pub write_buf: Vec<u8>,
    /// Set once the client completed `hello`; only then does it get events.
    pub authenticated: bool,
    pub id: u64,
    /// Peer UID from SO_PEERCRED (Linux only).
    pub peer_uid: Option<u32>,
    pub rate_limiter: RateLimiter,
    /// Set when the client sent an oversized frame and must be dropped.
    pub protocol_error: bool,
}

impl IpcClient {
    fn new(stream: UnixStream, id: u64, rate_limit: u32) -> Self {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!(id, "failed to set client socket non-blocking: {}", e);
        }

        let peer_uid = get_peer_uid(&stream);
        match peer_uid {
            Some(uid) => debug!(id, peer_uid = uid, "peer credentials"),
            None => warn!(id, "failed to read peer credentials"),
        }

        Self {
            stream,
            read_buf: Vec::with_capacity(4096),
            write_buf: Vec::new(),
            authenticated: false,
            id,
            peer_uid,
            rate_limiter: RateLimiter::new(rate_limit),
            protocol_error: false,
        }
    }

    /// Attempt to flush pending writes.
    pub fn flush_writes(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write zero")),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Enqueue a framed message (length prefix + payload) for sending.
    pub fn enqueue_message(&mut self, payload: &str) {
        let bytes = payload.as_bytes();
        let len = bytes.len() as u32;
        self.write_buf.extend_from_slice(&len.to_be_bytes());
        self.write_buf.extend_from_slice(bytes);
    }

    /// Enqueue an event, applying backpressure if buffer is too large.
    pub fn enqueue_event(&mut self, payload: &str) {
        if self.write_buf.len() > MAX_WRITE_BUFFER {
            warn!(client_id = self.id, "write buffer overflow, dropping event");
            return;
        }
        self.enqueue_message(payload);
    }

    /// Split complete frames off the front of the read buffer.  A partial
    /// frame stays buffered until the rest arrives.
    pub fn extract_messages(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        let mut consumed = 0;
        while let Some(header) = self.read_buf.get(consumed..consumed + 4) {
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            if len > MAX_MESSAGE_SIZE {
                error!(client_id = self.id, len, "message exceeds maximum size");
                self.read_buf.clear();
                self.protocol_error = true;
                return messages;
            }
            let start = consumed + 4;
            let end = start + len as usize;
            let Some(payload) = self.read_buf.get(start..end) else {
                break;
            };
            messages.push(String::from_utf8_lossy(payload).into_owned());
            consumed = end;
        }
        self.read_buf.drain(..consumed);
        messages
    }
}

/// IPC server managing the listener socket and all client connections.
pub struct IpcServer {
    pub socket_path: PathBuf,
    pub clients: HashMap<u64, IpcClient>,
    next_client_id: u64,
    /// Log every request, response and broadcast.
    pub ipc_trace: bool,
    /// Rate limit applied to newly connected clients.
    pub rate_limit: u32,
}

impl IpcServer {
    /// Create IPC server (does not bind yet; call `bind` after).
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            clients: HashMap::new(),
            next_client_id: 1,
            ipc_trace: false,
            rate_limit: DEFAULT_RATE_LIMIT,
        }
    }

    /// `$XDG_RUNTIME_DIR/gazewink-ipc.sock`, or a per-user directory in /tmp.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/tmp/gazewink-{}", unsafe { libc::getuid() }));
        PathBuf::from(runtime_dir).join("gazewink-ipc.sock")
    }

    /// Bind the listener socket and register it with calloop.
    pub fn bind(socket_path: &Path, loop_handle: &LoopHandle<'_, DaemonState>) -> anyhow::Result<()> {
        if let Some(parent) = socket_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Remove stale socket
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        listener.set_nonblocking(true)?;

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o700))?;
        }

        info!(?socket_path, "IPC server listening");

        let source = Generic::new(listener, Interest::READ, Mode::Level);
        loop_handle
            .insert_source(source, |_event, listener, state| {
                loop {
                    match listener.accept() {
                        Ok((stream, _addr)) => {
                            state.ipc_server.accept(stream);
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            error!("accept error: {}", e);
                            break;
                        }
                    }
                }
                Ok(PostAction::Continue)
            })
            .map_err(|e| anyhow::anyhow!("failed to register IPC listener: {}", e.error))?;

        Ok(())
    }

    /// Register a freshly accepted connection.  Returns the client id.
    pub fn accept(&mut self, stream: UnixStream) -> u64 {
        let client_id = self.next_client_id;
        self.next_client_id += 1;
        info!(client_id, "IPC client connected");
        self.clients
            .insert(client_id, IpcClient::new(stream, client_id, self.rate_limit));
        client_id
    }

    /// Poll all clients for readable data, dispatch messages, flush writes.
    /// Called once per event loop iteration.
    pub fn poll_clients(state: &mut DaemonState) {
        let client_ids: Vec<u64> = state.ipc_server.clients.keys().copied().collect();
        let mut disconnected = Vec::new();

        for client_id in client_ids {
            let Some(client) = state.ipc_server.clients.get_mut(&client_id) else {
                continue;
            };

            // Read available data
            let mut buf = [0u8; 4096];
            let read_result = match client.stream.read(&mut buf) {
                Ok(0) => Err(io::Error::new(io::ErrorKind::ConnectionReset, "eof")),
                Ok(n) => {
                    client.read_buf.extend_from_slice(&buf[..n]);
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = read_result {
                debug!(client_id, "client disconnected: {}", e);
                disconnected.push(client_id);
                continue;
            }

            let messages = client.extract_messages();
            if client.protocol_error {
                disconnected.push(client_id);
                continue;
            }

            for msg_str in messages {
                let rate_ok = state
                    .ipc_server
                    .clients
                    .get_mut(&client_id)
                    .map(|c| c.rate_limiter.allow())
                    .unwrap_or(false);

                if !rate_ok {
                    warn!(client_id, "rate limit exceeded, dropping message");
                    let resp = dispatch::error_response(0, "rate limit exceeded");
                    if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
                        client.enqueue_message(&resp);
                    }
                    continue;
                }

                if state.ipc_server.ipc_trace {
                    info!(client_id, "<< {}", msg_str);
                }
                let response = dispatch::handle_message(state, client_id, &msg_str);
                if let Some(ref resp) = response {
                    if state.ipc_server.ipc_trace {
                        info!(client_id, ">> {}", resp);
                    }
                    if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
                        client.enqueue_message(resp);
                    }
                }
            }

            if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
                if let Err(e) = client.flush_writes() {
                    debug!(client_id, "write error: {}", e);
                    disconnected.push(client_id);
                }
            }
        }

        for id in disconnected {
            info!(client_id = id, "removing disconnected IPC client");
            state.ipc_server.clients.remove(&id);
        }
    }

    /// Broadcast an event to all authenticated clients.
    pub fn broadcast_event(&mut self, event: &str) {
        if self.ipc_trace {
            info!("broadcast >> {}", event);
        }
        for client in self.clients.values_mut() {
            if client.authenticated {
                client.enqueue_event(event);
            }
        }
    }

    /// Flush queued broadcasts for every client.
    pub fn flush_all(&mut self) {
        let mut failed = Vec::new();
        for (id, client) in self.clients.iter_mut() {
            if let Err(e) = client.flush_writes() {
                debug!(client_id = *id, "write error: {}", e);
                failed.push(*id);
            }
        }
        for id in failed {
            self.clients.remove(&id);
        }
    }

    /// Remove the socket file.
    pub fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(path = ?self.socket_path, "failed to remove IPC socket: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &str) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(payload.as_bytes());
        out
    }

    fn client() -> (IpcClient, UnixStream) {
        let (a, b) = UnixStream::pair().expect("socket pair");
        (IpcClient::new(a, 1, 3), b)
    }

    #[test]
    fn test_extract_complete_messages() {
        let (mut c, _peer) = client();
        c.read_buf.extend(frame("(:type :ping :id 1)"));
        c.read_buf.extend(frame("(:type :ping :id 2)"));
        let msgs = c.extract_messages();
        assert_eq!(msgs, vec!["(:type :ping :id 1)", "(:type :ping :id 2)"]);
        assert!(c.read_buf.is_empty());
    }

    #[test]
    fn test_extract_waits_for_partial() {
        let (mut c, _peer) = client();
        let bytes = frame("(:type :ping :id 1)");
        c.read_buf.extend_from_slice(&bytes[..10]);
        assert!(c.extract_messages().is_empty());
        c.read_buf.extend_from_slice(&bytes[10..]);
        assert_eq!(c.extract_messages().len(), 1);
    }

    #[test]
    fn test_oversized_frame_flags_client() {
        let (mut c, _peer) = client();
        c.read_buf.extend_from_slice(&(MAX_MESSAGE_SIZE + 1).to_be_bytes());
        assert!(c.extract_messages().is_empty());
        assert!(c.protocol_error);
    }

    #[test]
    fn test_rate_limiter() {
        let (mut c, _peer) = client();
        assert!(c.rate_limiter.allow());
        assert!(c.rate_limiter.allow());
        assert!(c.rate_limiter.allow());
        assert!(!c.rate_limiter.allow(), "fourth message in the window is dropped");
    }

    #[test]
    fn test_enqueue_and_flush() {
        let (mut c, mut peer) = client();
        c.enqueue_message("(:ok)");
        c.flush_writes().expect("flush");
        let mut buf = [0u8; 9];
        peer.read_exact(&mut buf).expect("read");
        assert_eq!(&buf[..4], &5u32.to_be_bytes());
        assert_eq!(&buf[4..], b"(:ok)");
    }

    #[test]
    fn test_broadcast_only_to_authenticated() {
        let mut server = IpcServer::new(PathBuf::from("/nonexistent/gazewink.sock"));
        let (a, _pa) = UnixStream::pair().expect("socket pair");
        let (b, _pb) = UnixStream::pair().expect("socket pair");
        let id_a = server.accept(a);
        let id_b = server.accept(b);
        if let Some(c) = server.clients.get_mut(&id_a) {
            c.authenticated = true;
        }
        server.broadcast_event("(:type :event :event :blink)");
        assert!(!server.clients[&id_a].write_buf.is_empty());
        assert!(server.clients[&id_b].write_buf.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_peer_uid_is_current_user() {
        let (a, _b) = UnixStream::pair().expect("socket pair");
        assert_eq!(get_peer_uid(&a), Some(unsafe { libc::getuid() }));
    }

    #[test]
    fn test_bind_accepts_connections() {
        use crate::tracking::{ManualClock, TrackerConfig};
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("gazewink-test-{}.sock", std::process::id()));
        let mut event_loop = calloop::EventLoop::<DaemonState>::try_new().expect("event loop");
        let mut state = DaemonState::new(
            TrackerConfig::default(),
            100.0,
            Box::new(ManualClock::new(0.0)),
            path.clone(),
        );
        IpcServer::bind(&path, &event_loop.handle()).expect("bind");
        let mode = std::fs::metadata(&path).expect("socket file").permissions().mode();
        assert_eq!(mode & 0o777, 0o700);

        let _c1 = UnixStream::connect(&path).expect("connect");
        let _c2 = UnixStream::connect(&path).expect("connect");
        event_loop
            .dispatch(Some(std::time::Duration::from_millis(200)), &mut state)
            .expect("dispatch");
        assert_eq!(state.ipc_server.clients.len(), 2);
        let mut ids: Vec<u64> = state.ipc_server.clients.keys().copied().collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);

        state.ipc_server.cleanup();
        assert!(!path.exists());
    }
}
