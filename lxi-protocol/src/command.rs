//! Encoding of outgoing ASCII commands.
use crate::error::ProtocolError;

/// The single control character ending every command and every text reply.
pub const TERMINATOR: u8 = b'\n';

/// IEEE 488.2 common commands. They share the framing of every other command.
pub mod common {
    pub const IDENTIFY: &str = "*IDN?";
    pub const RESET: &str = "*RST";
    pub const CLEAR_STATUS: &str = "*CLS";
    pub const OPERATION_COMPLETE: &str = "*OPC?";
    pub const TRIGGER: &str = "*TRG";
    pub const EVENT_STATUS: &str = "*ESR?";
    pub const STATUS_BYTE: &str = "*STB?";
    pub const SELF_TEST: &str = "*TST?";
}

/// Trims the command and appends the terminator.
///
/// Commands that are empty after trimming are rejected.
pub fn encode_command(command: &str) -> Result<Vec<u8>, ProtocolError> {
    let command = command.trim();
    if command.is_empty() {
        return Err(ProtocolError::EmptyCommand);
    }
    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(TERMINATOR);
    Ok(bytes)
}

/// Whether the command header asks for a reply, e.g. `MEAS:VOLT?` or `:WAV:DATA? CHAN1`.
pub fn is_query(command: &str) -> bool {
    command
        .split_whitespace()
        .next()
        .is_some_and(|header| header.ends_with('?'))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn appends_single_terminator() {
        assert_eq!(encode_command("  *IDN?\r\n").unwrap(), b"*IDN?\n".to_vec());
        assert_eq!(encode_command("VOLT 1.5").unwrap(), b"VOLT 1.5\n".to_vec());
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(encode_command(""), Err(ProtocolError::EmptyCommand)));
        assert!(matches!(encode_command(" \n"), Err(ProtocolError::EmptyCommand)));
    }

    #[test]
    fn detects_queries() {
        assert!(is_query("*IDN?"));
        assert!(is_query(":WAV:DATA? CHAN1"));
        assert!(!is_query("VOLT 1.5"));
        assert!(!is_query(""));
    }
}
