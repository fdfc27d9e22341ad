//! Simulated instruments.
use std::collections::VecDeque;

use lxi_protocol::{Identity, command::common};
use lxi_server::Response;

pub mod oscilloscope;
pub mod power_supply;

const NO_ERROR: &str = "0,\"No error\"";
pub const UNDEFINED_HEADER: &str = "-113,\"Undefined header\"";
pub const ILLEGAL_PARAMETER: &str = "-224,\"Illegal parameter value\"";
pub const OUT_OF_RANGE: &str = "-222,\"Data out of range\"";
pub const SETTINGS_CONFLICT: &str = "-221,\"Settings conflict\"";

const ERROR_QUEUE_LEN: usize = 16;

/// A received command, split into its upper-cased header and its argument.
#[derive(Debug, PartialEq, Eq)]
pub struct Command<'a> {
    header: String,
    argument: Option<&'a str>,
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Command<'a> {
        let line = line.trim();
        let (header, argument) = match line.split_once(char::is_whitespace) {
            Some((header, argument)) => (header, Some(argument.trim())),
            None => (line, None),
        };
        Command {
            header: header.trim_start_matches(':').to_ascii_uppercase(),
            argument: argument.filter(|a| !a.is_empty()),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn argument(&self) -> Option<&'a str> {
        self.argument
    }

    pub fn number(&self) -> Option<f64> {
        self.argument?.parse::<f64>().ok()
    }

    /// `ON`/`1` or `OFF`/`0`.
    pub fn switch(&self) -> Option<bool> {
        match self.argument?.to_ascii_uppercase().as_str() {
            "ON" | "1" => Some(true),
            "OFF" | "0" => Some(false),
            _ => None,
        }
    }
}

/// The SCPI error queue, drained by `SYST:ERR?`.
#[derive(Debug, Default)]
pub struct ErrorQueue {
    errors: VecDeque<&'static str>,
}

impl ErrorQueue {
    pub fn push(&mut self, error: &'static str) {
        if self.errors.len() == ERROR_QUEUE_LEN {
            self.errors.pop_front();
        }
        self.errors.push_back(error);
    }

    pub fn pop(&mut self) -> &'static str {
        self.errors.pop_front().unwrap_or(NO_ERROR)
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Handles the IEEE 488.2 common commands and the error queue.
/// `*RST` is left to the instrument.
pub fn handle_common(
    command: &Command,
    identity: &Identity,
    errors: &mut ErrorQueue,
) -> Option<Response> {
    let response = match command.header() {
        common::IDENTIFY => Response::line(identity.to_string()),
        common::OPERATION_COMPLETE => Response::line("1"),
        common::EVENT_STATUS | common::STATUS_BYTE => {
            Response::line(if errors.is_empty() { "0" } else { "4" })
        }
        common::SELF_TEST => Response::line("0"),
        common::CLEAR_STATUS => {
            errors.clear();
            Response::None
        }
        common::TRIGGER => Response::None,
        "SYST:ERR?" | "SYSTEM:ERROR?" | "SYST:ERR:NEXT?" => Response::line(errors.pop()),
        _ => return None,
    };
    Some(response)
}
