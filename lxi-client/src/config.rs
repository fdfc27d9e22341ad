use std::time::Duration;

use crate::Instrument;

/// Commands driving a waveform acquisition. The defaults follow the Rigol
/// dialect most low-cost scopes share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformCommands {
    /// Prefix of the source selection, sent as `<source> <channel>`.
    pub source: String,
    pub mode: String,
    /// Must select one byte per sample.
    pub format: String,
    pub preamble: String,
    pub data: String,
}

impl Default for WaveformCommands {
    fn default() -> Self {
        Self {
            source: ":WAV:SOUR".to_string(),
            mode: ":WAV:MODE NORM".to_string(),
            format: ":WAV:FORM BYTE".to_string(),
            preamble: ":WAV:PRE?".to_string(),
            data: ":WAV:DATA?".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    /// Pause between two looks at the socket while a reply accumulates.
    pub poll_interval: Duration,
    /// A read with no byte after this long returns an empty reply.
    pub first_byte_timeout: Duration,
    /// Once any byte arrived, a text read may run this long before giving up
    /// on the terminator.
    pub continuation_timeout: Duration,
    /// Quiet gap after which a bitmap is considered complete.
    pub image_settle_delay: Duration,
    /// Overall budget of a block or bitmap read.
    pub binary_timeout: Duration,
    /// Depth of the connection state broadcast channel.
    pub event_capacity: usize,
    pub waveform: WaveformCommands,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(1000),
            send_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(5),
            first_byte_timeout: Duration::from_millis(400),
            continuation_timeout: Duration::from_millis(750),
            image_settle_delay: Duration::from_millis(100),
            binary_timeout: Duration::from_secs(5),
            event_capacity: 16,
            waveform: WaveformCommands::default(),
        }
    }
}

/// Builder to create an [Instrument] and modify configuration options
///
/// # Example
///
/// ```
/// use lxi_client::Builder;
/// use std::time::Duration;
///
/// let instrument = Builder::new()
///     .first_byte_timeout(Duration::from_millis(300))
///     .continuation_timeout(Duration::from_millis(700))
///     .build();
/// assert!(!instrument.state().is_connected());
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set how long a read waits for the first byte
    pub fn first_byte_timeout(mut self, timeout: Duration) -> Self {
        self.config.first_byte_timeout = timeout;
        self
    }

    /// Set how long a text read may run once data started arriving
    pub fn continuation_timeout(mut self, timeout: Duration) -> Self {
        self.config.continuation_timeout = timeout;
        self
    }

    pub fn image_settle_delay(mut self, delay: Duration) -> Self {
        self.config.image_settle_delay = delay;
        self
    }

    pub fn binary_timeout(mut self, timeout: Duration) -> Self {
        self.config.binary_timeout = timeout;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    pub fn waveform_commands(mut self, commands: WaveformCommands) -> Self {
        self.config.waveform = commands;
        self
    }

    /// Build and return a disconnected instrument
    pub fn build(self) -> Instrument {
        Instrument::new(self.config)
    }
}
