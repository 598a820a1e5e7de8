//! TCP debug server
//!
//! Listens for one DAP client at a time. Each connection gets a read loop on
//! the accepting thread and a shared write half; a dedicated restart thread
//! parks on a condvar and tears the session down when the client disconnects,
//! after which the listener accepts the next client.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use tracing::{error, info, warn};

use crate::adapter::Debugger;
use crate::config::ServerConfig;
use crate::error::{DebugError, DebugResult};
use crate::protocol::Request;
use crate::session::DapSession;
use crate::transport::FramedReader;

/// Handshake with the restart thread: the accept loop requests a teardown
/// and waits for its completion before taking the next client.
#[derive(Default)]
struct RestartSignal {
    state: Mutex<RestartState>,
    cond: Condvar,
}

#[derive(Default)]
struct RestartState {
    requested: bool,
    done: bool,
}

impl RestartSignal {
    fn request(&self) {
        let mut state = self.state.lock().unwrap();
        state.requested = true;
        state.done = false;
        self.cond.notify_all();
    }

    fn wait_request(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.requested {
            state = self.cond.wait(state).unwrap();
        }
        state.requested = false;
    }

    fn complete(&self) {
        let mut state = self.state.lock().unwrap();
        state.done = true;
        self.cond.notify_all();
    }

    fn await_completion(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.done {
            state = self.cond.wait(state).unwrap();
        }
    }
}

// ── DebugServer ──────────────────────────────────────────────────────────────

/// The debug adapter's TCP front end.
pub struct DebugServer {
    debugger: Arc<Debugger>,
    listener: TcpListener,
    restart: Arc<RestartSignal>,
}

impl DebugServer {
    /// Bind the listener. The bound address is available before serving, so
    /// callers (and tests) can bind port 0.
    pub fn bind(debugger: Arc<Debugger>, config: &ServerConfig) -> DebugResult<Self> {
        let listener = TcpListener::bind(config.listen_addr())?;
        Ok(Self {
            debugger,
            listener,
            restart: Arc::new(RestartSignal::default()),
        })
    }

    pub fn local_addr(&self) -> DebugResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients forever, one at a time.
    pub fn serve(&self) -> DebugResult<()> {
        let restart = self.restart.clone();
        let debugger = self.debugger.clone();
        thread::spawn(move || loop {
            restart.wait_request();
            debugger.end_session();
            restart.complete();
        });

        info!(addr = %self.local_addr()?, "debug server listening");
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(err) = self.serve_client(stream) {
                        warn!(%err, "client connection ended");
                    }
                    self.restart.request();
                    self.restart.await_completion();
                }
                Err(err) => error!(%err, "accept failed"),
            }
        }
        Ok(())
    }

    /// Run one client's read loop to completion.
    fn serve_client(&self, stream: TcpStream) -> DebugResult<()> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        info!(%peer, "client connected");

        let write_half = stream.try_clone()?;
        let session = Arc::new(DapSession::new(Box::new(write_half)));
        let mut reader = FramedReader::new(stream);
        self.debugger.start_session(session);

        loop {
            let message = match reader.read() {
                Ok(message) => message,
                Err(DebugError::Disconnected) => {
                    info!(%peer, "client disconnected");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            let request: Request = match serde_json::from_value(message) {
                Ok(request) => request,
                Err(err) => {
                    warn!(%err, "malformed request");
                    continue;
                }
            };
            let is_disconnect = request.command == "disconnect";
            self.debugger.handle_request(&request);
            if is_disconnect {
                info!(%peer, "disconnect requested");
                return Ok(());
            }
        }
    }
}
