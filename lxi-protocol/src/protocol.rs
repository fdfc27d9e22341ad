use std::{fmt::Display, str::FromStr};

use crate::error::ProtocolError;

/// The raw-socket port reserved for SCPI by the LXI standard.
pub const DEFAULT_PORT: u16 = 5025;

/// Host and port of an instrument.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Endpoint {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parses `host`, `host:port`, `[v6]` or `[v6]:port`.
/// The port defaults to [`DEFAULT_PORT`] when omitted.
impl FromStr for Endpoint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidEndpoint(s.to_string());
        let s = s.trim();

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            match tail {
                "" => (host, None),
                _ => (host, Some(tail.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else {
            match s.split_once(':') {
                Some((host, port)) if !port.contains(':') => (host, Some(port)),
                Some(_) => return Err(invalid()),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => DEFAULT_PORT,
        };
        Ok(Endpoint::new(host, port))
    }
}

impl From<(&str, u16)> for Endpoint {
    fn from((host, port): (&str, u16)) -> Self {
        Endpoint::new(host, port)
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        Endpoint::new(addr.ip().to_string(), addr.port())
    }
}

/// The answer to `*IDN?`.
///
/// Created once per successful connection and replaced on reconnect.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    manufacturer: String,
    model: String,
    serial: String,
    firmware: String,
}

impl Identity {
    pub fn new(
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        serial: impl Into<String>,
        firmware: impl Into<String>,
    ) -> Identity {
        Identity {
            manufacturer: manufacturer.into(),
            model: model.into(),
            serial: serial.into(),
            firmware: firmware.into(),
        }
    }

    /// Parses the four comma-separated fields of an identity reply.
    ///
    /// Any commas past the third belong to the firmware field, since some
    /// instruments report several version components there.
    pub fn parse(reply: &str) -> Result<Identity, ProtocolError> {
        let line = reply.trim();
        let fields: Vec<&str> = line.splitn(4, ',').map(str::trim).collect();
        match fields[..] {
            [manufacturer, model, serial, firmware]
                if !manufacturer.is_empty() && !model.is_empty() =>
            {
                Ok(Identity::new(manufacturer, model, serial, firmware))
            }
            _ => Err(ProtocolError::InvalidIdentity(line.to_string())),
        }
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn firmware(&self) -> &str {
        &self.firmware
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_identity() {
        let identity = Identity::parse("ACME,Model9,SN123,1.0\n").unwrap();
        assert_eq!(identity, Identity::new("ACME", "Model9", "SN123", "1.0"));
        assert_eq!(identity.to_string(), "ACME,Model9,SN123,1.0");
    }

    #[test]
    fn identity_keeps_extra_commas_in_firmware() {
        let identity = Identity::parse("RIGOL TECHNOLOGIES, DS1104Z, DS1ZA1, 00.04,SP3").unwrap();
        assert_eq!(identity.manufacturer(), "RIGOL TECHNOLOGIES");
        assert_eq!(identity.serial(), "DS1ZA1");
        assert_eq!(identity.firmware(), "00.04,SP3");
    }

    #[test]
    fn reject_malformed_identity() {
        for reply in ["", "\n", "ACME,Model9", ",Model9,SN,1.0", "-113,\"Undefined header\""] {
            assert!(
                matches!(Identity::parse(reply), Err(ProtocolError::InvalidIdentity(_))),
                "{reply:?} should be rejected"
            );
        }
    }

    #[test]
    fn parse_endpoints() {
        assert_eq!(
            "10.0.0.7:5555".parse::<Endpoint>().unwrap(),
            Endpoint::new("10.0.0.7", 5555)
        );
        assert_eq!(
            "scope.lab".parse::<Endpoint>().unwrap(),
            Endpoint::new("scope.lab", DEFAULT_PORT)
        );
        assert_eq!(
            "[::1]:6000".parse::<Endpoint>().unwrap(),
            Endpoint::new("::1", 6000)
        );
        assert_eq!(Endpoint::new("::1", 6000).to_string(), "[::1]:6000");
        assert!("host:port".parse::<Endpoint>().is_err());
        assert!(":5025".parse::<Endpoint>().is_err());
        assert!("::1:5025".parse::<Endpoint>().is_err());
    }
}
