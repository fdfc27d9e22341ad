//! Helpers for the end-to-end tests: a scripted instrument served on a
//! loopback port, for the client to talk to.
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use lxi_server::{
    Response, ScpiInstrument,
    server::{Builder, Server},
};
use tokio::net::TcpListener;

/// Answers each command from a fixed table and remembers what it received.
/// Commands missing from the table get no reply.
#[derive(Default)]
pub struct ScriptedInstrument {
    replies: HashMap<String, Response>,
    received: Mutex<Vec<String>>,
}

impl ScriptedInstrument {
    pub fn new() -> ScriptedInstrument {
        ScriptedInstrument::default()
    }

    /// Identifies as `identity` when asked `*IDN?`.
    pub fn identifying(identity: &str) -> ScriptedInstrument {
        ScriptedInstrument::new().on("*IDN?", Response::line(identity))
    }

    pub fn on(mut self, command: &str, response: Response) -> Self {
        self.replies.insert(command.to_string(), response);
        self
    }

    /// Replies to `command` in pieces, each sent after its delay in
    /// milliseconds.
    pub fn on_segments(self, command: &str, segments: &[(u64, &str)]) -> Self {
        let segments = segments
            .iter()
            .map(|(delay, text)| {
                (
                    Duration::from_millis(*delay),
                    Bytes::copy_from_slice(text.as_bytes()),
                )
            })
            .collect();
        self.on(command, Response::Segments(segments))
    }

    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ScpiInstrument for ScriptedInstrument {
    fn handle(&self, command: &str) -> Response {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());
        self.replies.get(command).cloned().unwrap_or(Response::None)
    }
}

/// Serves `instrument` on a free loopback port until the runtime shuts down.
pub async fn spawn<T: ScpiInstrument>(instrument: T) -> SocketAddr {
    let _ = env_logger::builder().is_test(true).try_init();
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind loopback listener");
    let addr = listener.local_addr().expect("Listener has no address");
    let server: Server<T> = Builder::new()
        .rw_timeout(Duration::from_secs(10))
        .build(instrument);
    tokio::spawn(async move { server.serve(listener).await });
    addr
}

/// Serves a shared instrument so the test can inspect it afterwards.
pub async fn spawn_shared(instrument: ScriptedInstrument) -> (SocketAddr, Arc<ScriptedInstrument>) {
    let instrument = Arc::new(instrument);
    let addr = spawn(Arc::clone(&instrument)).await;
    (addr, instrument)
}
