//! # LXI Client
//!
//! An async client for bench instruments (oscilloscopes, function generators,
//! electronic loads, power supplies, LCR meters) speaking SCPI over a raw
//! LXI TCP socket.
//!
//! ## Overview
//!
//! Instrument drivers are thin: they format a command and interpret the
//! reply. This crate provides what sits beneath them:
//!
//! - **Connection supervision**: connect with a bounded timeout, identify the
//!   instrument with `*IDN?`, track and broadcast the connection state
//! - **Command transmission**: trimmed ASCII with a single LF, under a send timeout
//! - **Adaptive reply reading**: text replies have no length field, so reads
//!   poll the socket and stop at the terminator or when a two-phase time
//!   budget runs out
//! - **Typed decoding**: booleans, integers, floats and strings, with
//!   sentinels instead of errors for malformed replies
//! - **Binary payloads**: bitmap screenshots and definite-length waveform
//!   blocks, including preamble-based scaling of samples
//!
//! Every query discards stale input, sends the command, then reads the
//! reply. There are no request identifiers on the wire, so skipping the
//! discard would attribute leftovers of a previous exchange to the next one.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use lxi_client::Instrument;
//!
//! let mut scope = Instrument::default();
//! if !scope.connect("192.168.1.50:5555".parse::<Endpoint>()?).await {
//!     return Ok(());
//! }
//! println!("Connected to {}", scope.identity().unwrap());
//!
//! let vpp = scope.query_float(":MEAS:VPP? CHAN1").await?;
//! let waveform = scope.read_waveform("CHAN1").await?;
//! let screenshot = scope.query_image(":DISP:DATA? ON,OFF,BMP").await?;
//! ```
//!
//! ## Error Handling
//!
//! [`Instrument::connect`] never fails; it returns `false` and logs the
//! reason. Other operations return [`Error::NotConnected`] immediately when
//! there is no connection, and propagate transport failures. A silent
//! instrument yields an empty [`Reply`], and a reply that does not parse
//! yields a sentinel (`false`, `i64::MIN`, NaN, empty string) from the
//! `query_*` helpers. Use [`Instrument::query`] and the tagged accessors of
//! [`Reply`] to tell those cases apart.
//!
//! ## Concurrency
//!
//! One instrument handles one exchange at a time: every operation takes
//! `&mut self`. Separate instruments can be polled concurrently from one task
//! or many.
//!
//! ## Logging
//!
//! This crate uses the `log` crate: connections and identities at `info`,
//! each command and reply size at `debug`, raw bytes at `trace`.
pub mod config;
pub mod connection;
pub mod error;
pub mod transport;

pub use config::{Builder, Config, WaveformCommands};
pub use connection::ConnectionState;
pub use error::{Error, Result};
pub use lxi_protocol::{Endpoint, Identity, Preamble, Reply, Sample, Waveform};
pub use transport::{Framing, Terminated};

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use lxi_protocol::command::{TERMINATOR, common};
use tokio::{io::AsyncWriteExt, net::TcpStream, sync::broadcast};

use crate::connection::StateTracker;

/// One instrument reachable over a raw LXI socket.
#[derive(Debug)]
pub struct Instrument {
    config: Config,
    stream: Option<TcpStream>,
    endpoint: Option<Endpoint>,
    identity: Option<Identity>,
    state: StateTracker,
}

impl Default for Instrument {
    fn default() -> Self {
        Instrument::new(Config::default())
    }
}

impl Instrument {
    pub fn new(config: Config) -> Instrument {
        let state = StateTracker::new(config.event_capacity);
        Instrument {
            config,
            stream: None,
            endpoint: None,
            identity: None,
            state,
        }
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The endpoint of the latest connection attempt.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Identity reported by the instrument on the current connection.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Last known state, without probing the socket.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Receives every state transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Opens a connection and identifies the instrument.
    ///
    /// Returns `false` if the socket cannot be opened within the connect
    /// timeout or if the instrument does not answer `*IDN?` with a valid
    /// identity. An existing connection is closed first.
    pub async fn connect(&mut self, endpoint: impl Into<Endpoint>) -> bool {
        if self.stream.is_some() {
            self.disconnect().await;
        }

        let endpoint = endpoint.into();
        self.endpoint = Some(endpoint.clone());
        self.identity = None;
        self.state.set(ConnectionState::Connecting);
        log::debug!(
            "Connecting to {} (timeout {:?})",
            endpoint,
            self.config.connect_timeout
        );

        let connect = TcpStream::connect((endpoint.host(), endpoint.port()));
        let stream = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                log::warn!("Failed to connect to {}: {}", endpoint, e);
                self.state.set(ConnectionState::Disconnected);
                return false;
            }
            Err(_) => {
                log::warn!(
                    "Connecting to {} timed out after {:?}",
                    endpoint,
                    self.config.connect_timeout
                );
                self.state.set(ConnectionState::Disconnected);
                return false;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Failed to set TCP_NODELAY on {}: {}", endpoint, e);
        }
        self.stream = Some(stream);

        match self.identify().await {
            Ok(identity) => {
                log::info!("Connected to {}: {}", endpoint, identity);
                self.identity = Some(identity);
                self.state.set(ConnectionState::Connected);
                true
            }
            Err(e) => {
                log::warn!("{} did not identify itself: {}", endpoint, e);
                self.close_stream().await;
                self.state.set(ConnectionState::Disconnected);
                false
            }
        }
    }

    async fn identify(&mut self) -> Result<Identity> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let raw = transport::query(stream, &self.config, common::IDENTIFY).await?;
        Ok(Identity::parse(&Reply::new(raw).text())?)
    }

    /// Checks the socket and reports whether the connection is up.
    ///
    /// The instrument may drop the connection at any time. A drop noticed
    /// here is published to subscribers like any other transition.
    pub fn is_connected(&mut self) -> bool {
        let closed = self
            .stream
            .as_ref()
            .is_some_and(connection::peer_closed);
        if closed {
            self.connection_lost();
        }
        self.state.get().is_connected()
    }

    /// Closes the connection. Errors while closing are ignored.
    pub async fn disconnect(&mut self) {
        self.close_stream().await;
        self.identity = None;
        self.state.set(ConnectionState::Disconnected);
    }

    async fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                log::debug!("Ignoring error while closing: {}", e);
            }
            if let Some(endpoint) = &self.endpoint {
                log::info!("Disconnected from {}", endpoint);
            }
        }
    }

    fn connection_lost(&mut self) {
        if self.stream.take().is_some() {
            match &self.endpoint {
                Some(endpoint) => log::warn!("{} closed the connection", endpoint),
                None => log::warn!("Instrument closed the connection"),
            }
        }
        self.identity = None;
        self.state.set(ConnectionState::Disconnected);
    }

    /// Notes a dropped connection before handing the result on.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(Error::ConnectionLost)) {
            self.connection_lost();
        }
        result
    }

    fn channel(&mut self) -> Result<(&mut TcpStream, &Config)> {
        if !self.state.get().is_connected() {
            return Err(Error::NotConnected);
        }
        match self.stream.as_mut() {
            Some(stream) => Ok((stream, &self.config)),
            None => Err(Error::NotConnected),
        }
    }

    /// Sends one command without reading a reply.
    pub async fn send(&mut self, command: &str) -> Result<()> {
        let (stream, config) = self.channel()?;
        let result = transport::send(stream, command, config.send_timeout).await;
        self.track(result)
    }

    /// Discards pending input and returns the number of bytes thrown away.
    pub fn clear_buffer(&mut self) -> Result<usize> {
        let (stream, _) = self.channel()?;
        let result = transport::clear_buffer(stream);
        self.track(result)
    }

    /// Reads one reply ending at `terminator`.
    pub async fn read_framed_reply(&mut self, terminator: u8) -> Result<Vec<u8>> {
        self.read_framed(&mut Terminated(terminator)).await
    }

    /// Reads one reply delimited by a custom framing.
    pub async fn read_framed<F: Framing + ?Sized>(&mut self, framing: &mut F) -> Result<Vec<u8>> {
        let (stream, config) = self.channel()?;
        let result = transport::read_framed_reply(stream, config, framing).await;
        self.track(result)
    }

    /// Reads one LF-terminated reply.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        self.read_framed_reply(TERMINATOR).await.map(Reply::new)
    }

    /// Discards stale input, sends `command` and reads its reply.
    pub async fn query(&mut self, command: &str) -> Result<Reply> {
        let (stream, config) = self.channel()?;
        let result = transport::query(stream, config, command).await;
        self.track(result).map(Reply::new)
    }

    pub async fn query_text(&mut self, command: &str) -> Result<String> {
        Ok(self.query(command).await?.to_text())
    }

    pub async fn query_bool(&mut self, command: &str) -> Result<bool> {
        Ok(self.query(command).await?.to_bool())
    }

    /// `i64::MIN` if the reply is not an integer.
    pub async fn query_int(&mut self, command: &str) -> Result<i64> {
        Ok(self.query(command).await?.to_int())
    }

    /// NaN if the reply is not a number.
    pub async fn query_float(&mut self, command: &str) -> Result<f64> {
        Ok(self.query(command).await?.to_float())
    }

    /// Sends `command` and reads a definite-length block reply.
    pub async fn query_block(&mut self, command: &str) -> Result<Option<Bytes>> {
        let (stream, config) = self.channel()?;
        let result = async {
            transport::clear_buffer(stream)?;
            transport::send(stream, command, config.send_timeout).await?;
            transport::read_block(stream, config).await
        }
        .await;
        self.track(result)
    }

    /// Sends `command` and reads the raw bytes of a bitmap reply, starting
    /// at its magic.
    pub async fn query_bitmap(&mut self, command: &str) -> Result<Option<Vec<u8>>> {
        let (stream, config) = self.channel()?;
        let result = async {
            transport::clear_buffer(stream)?;
            transport::send(stream, command, config.send_timeout).await?;
            transport::read_bitmap(stream, config).await
        }
        .await;
        self.track(result)
    }

    /// Sends `command` and decodes the bitmap it returns.
    ///
    /// `None` if the reply holds no bitmap or the bitmap does not decode.
    pub async fn query_image(&mut self, command: &str) -> Result<Option<DynamicImage>> {
        let Some(bitmap) = self.query_bitmap(command).await? else {
            return Ok(None);
        };
        match image::load_from_memory_with_format(&bitmap, ImageFormat::Bmp) {
            Ok(image) => Ok(Some(image)),
            Err(e) => {
                log::warn!("Failed to decode {} byte bitmap: {}", bitmap.len(), e);
                Ok(None)
            }
        }
    }

    /// Fetches the scaling preamble of the current waveform source.
    pub async fn read_preamble(&mut self) -> Result<Preamble> {
        let command = self.config.waveform.preamble.clone();
        let reply = self.query(&command).await?;
        Ok(Preamble::parse(&reply.text())?)
    }

    /// Acquires and scales the waveform of `source` (e.g. `CHAN1`).
    ///
    /// Source, mode and the one-byte sample format are set and the preamble
    /// is read before the data is requested, so the scale always matches the
    /// block. `None` if no complete block arrives.
    pub async fn read_waveform(&mut self, source: &str) -> Result<Option<Waveform>> {
        let commands = self.config.waveform.clone();
        self.send(&format!("{} {}", commands.source, source.trim()))
            .await?;
        self.send(&commands.mode).await?;
        self.send(&commands.format).await?;

        let preamble = self.read_preamble().await?;
        log::debug!("Waveform preamble for {}: {:?}", source, preamble);

        let Some(raw) = self.query_block(&commands.data).await? else {
            return Ok(None);
        };
        Ok(Some(preamble.decode(&raw)))
    }

    /// `*RST`
    pub async fn reset(&mut self) -> Result<()> {
        self.send(common::RESET).await
    }

    /// `*CLS`
    pub async fn clear_status(&mut self) -> Result<()> {
        self.send(common::CLEAR_STATUS).await
    }

    /// `*TRG`
    pub async fn trigger(&mut self) -> Result<()> {
        self.send(common::TRIGGER).await
    }

    /// `*OPC?`; true once all pending operations have finished.
    pub async fn operation_complete(&mut self) -> Result<bool> {
        self.query_bool(common::OPERATION_COMPLETE).await
    }

    /// `*ESR?`
    pub async fn event_status(&mut self) -> Result<i64> {
        self.query_int(common::EVENT_STATUS).await
    }

    /// `*STB?`
    pub async fn status_byte(&mut self) -> Result<i64> {
        self.query_int(common::STATUS_BYTE).await
    }

    /// `*TST?`; zero means the self-test passed.
    pub async fn self_test(&mut self) -> Result<i64> {
        self.query_int(common::SELF_TEST).await
    }
}
