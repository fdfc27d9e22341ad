//! Connection state tracking.
use std::{fmt::Display, io, mem::MaybeUninit};

use socket2::SockRef;
use tokio::{net::TcpStream, sync::broadcast};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// The socket is being opened or the identity handshake is running.
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Owns the state and broadcasts every transition exactly once.
#[derive(Debug)]
pub(crate) struct StateTracker {
    state: ConnectionState,
    events: broadcast::Sender<ConnectionState>,
}

impl StateTracker {
    pub(crate) fn new(capacity: usize) -> StateTracker {
        let (events, _) = broadcast::channel(capacity.max(1));
        StateTracker {
            state: ConnectionState::Disconnected,
            events,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        self.state
    }

    /// Returns whether the state actually changed.
    pub(crate) fn set(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return false;
        }
        log::debug!("Connection state {} -> {}", self.state, next);
        self.state = next;
        // No subscribers is fine
        let _ = self.events.send(next);
        true
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.events.subscribe()
    }
}

/// Whether the peer has closed or reset the socket. Pending bytes are left
/// in place.
///
/// Asks the kernel directly, so a FIN that arrived while the task never
/// yielded is still seen.
pub(crate) fn peer_closed(stream: &TcpStream) -> bool {
    let mut byte = [MaybeUninit::<u8>::uninit()];
    match SockRef::from(stream).peek(&mut byte) {
        Ok(0) => true,
        Ok(_) => false,
        // Nothing readable: the socket is idle but open
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => false,
        Err(e) => {
            log::debug!("Socket peek failed: {}", e);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn duplicate_transitions_are_suppressed() {
        let mut tracker = StateTracker::new(4);
        let mut rx = tracker.subscribe();

        assert!(!tracker.set(ConnectionState::Disconnected));
        assert!(tracker.set(ConnectionState::Connecting));
        assert!(tracker.set(ConnectionState::Connected));
        assert!(!tracker.set(ConnectionState::Connected));

        assert_eq!(rx.try_recv().unwrap(), ConnectionState::Connecting);
        assert_eq!(rx.try_recv().unwrap(), ConnectionState::Connected);
        assert!(rx.try_recv().is_err());
    }

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn remote_close_is_detected_without_consuming() {
        let (client, mut server) = pair().await;

        assert!(!peer_closed(&client));

        server.write_all(b"1\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!peer_closed(&client));
        let mut buf = [0u8; 8];
        assert_eq!(client.try_read(&mut buf).unwrap(), 2);

        drop(server);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(peer_closed(&client));
    }

    #[tokio::test]
    async fn remote_close_is_detected_without_yielding() {
        let (client, server) = pair().await;
        assert!(!peer_closed(&client));

        drop(server);
        // Blocks the runtime, so the reactor never sees the FIN arrive
        std::thread::sleep(Duration::from_millis(50));
        assert!(peer_closed(&client));
    }
}
