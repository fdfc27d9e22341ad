use std::{io::ErrorKind, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use lxi_protocol::{codec::ScpiCodec, error::ProtocolError};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::{Response, ScpiInstrument};

#[derive(Debug, Clone)]
pub struct Config {
    pub read_write_timeout: Duration,
    pub max_command_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_write_timeout: Duration::from_secs(30),
            max_command_len: 64 * 1024,
        }
    }
}

#[derive(Debug)]
pub struct Server<T: ScpiInstrument> {
    instrument: T,
    config: Config,
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use lxi_server::server::Builder;
/// use std::time::Duration;
///
/// let server = Builder::new()
///     .max_command_len(1024)
///     .rw_timeout(Duration::from_secs(20))
///     .build(my_instrument);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the longest command line this server accepts.
    pub fn max_command_len(mut self, len: usize) -> Self {
        self.config.max_command_len = len;
        self
    }

    /// Set the TCP read and write timeout
    pub fn rw_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_write_timeout = timeout;
        self
    }

    /// Build and return the server
    pub fn build<T: ScpiInstrument>(self, instrument: T) -> Server<T> {
        Server::new(instrument, self.config)
    }
}

type Connection = Framed<TcpStream, ScpiCodec>;

impl<T: ScpiInstrument> Server<T> {
    pub fn new(instrument: T, config: Config) -> Server<T> {
        Server { instrument, config }
    }

    pub fn instrument(&self) -> &T {
        &self.instrument
    }

    pub async fn listen(&self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accepts clients on an already bound listener, one at a time.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        log::info!(
            "Server listening for connections on {}",
            listener.local_addr()?
        );

        loop {
            match listener.accept().await {
                Ok((tcp, addr)) => {
                    log::info!("New client connection from {}", addr);
                    if let Err(e) = self.handle_client(tcp).await {
                        log::error!("Client error: {}", e);
                    }
                    log::info!("Client {} disconnected", addr);
                }
                Err(e) => log::error!("Connection error: {}", e),
            }
        }
    }

    async fn handle_client(&self, tcp: TcpStream) -> Result<(), ProtocolError> {
        tcp.set_nodelay(true)?;
        let mut connection = Framed::new(tcp, ScpiCodec::new(self.config.max_command_len));

        loop {
            let next = tokio::time::timeout(self.config.read_write_timeout, connection.next());
            let command = match next.await {
                Ok(Some(Ok(command))) => command,
                Ok(None) => break, // Client disconnected
                Err(_) => {
                    log::error!("Client read timeout, closing connection");
                    break;
                }
                Ok(Some(Err(ProtocolError::Io(err))))
                    if err.kind() == ErrorKind::ConnectionAborted
                        || err.kind() == ErrorKind::ConnectionReset =>
                {
                    break;
                }
                Ok(Some(Err(other))) => return Err(other),
            };

            if command.is_empty() {
                continue;
            }
            if !self.process_command(&command, &mut connection).await? {
                break;
            }
        }
        Ok(())
    }

    /// Forwards one command to the instrument and writes its response.
    /// Returns `false` once the connection should be closed.
    async fn process_command(
        &self,
        command: &str,
        connection: &mut Connection,
    ) -> Result<bool, ProtocolError> {
        log::debug!("Received command {:?}", command);
        match self.instrument.handle(command) {
            Response::None => log::debug!("No response"),
            Response::Raw(bytes) => self.write(connection, bytes).await?,
            Response::Segments(segments) => {
                for (delay, bytes) in segments {
                    tokio::time::sleep(delay).await;
                    self.write(connection, bytes).await?;
                }
            }
            Response::Close => {
                log::info!("Closing connection on behalf of the instrument");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn write(&self, connection: &mut Connection, bytes: Bytes) -> Result<(), ProtocolError> {
        log::debug!("Sending {} byte response", bytes.len());
        log::trace!("Response data: {:02x?}", &bytes[..]);
        match tokio::time::timeout(self.config.read_write_timeout, connection.send(bytes)).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Io(ErrorKind::TimedOut.into())),
        }
    }
}
