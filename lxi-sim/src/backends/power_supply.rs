//! Single-channel bench power supply driving a fixed resistive load.
use std::sync::{Mutex, PoisonError};

use lxi_protocol::Identity;
use lxi_server::{Response, ScpiInstrument};

use super::{Command, ErrorQueue, ILLEGAL_PARAMETER, OUT_OF_RANGE, UNDEFINED_HEADER, handle_common};

const LOAD_OHMS: f64 = 10.0;
const MAX_CURRENT: f64 = 5.0;
const DEFAULT_CURRENT_LIMIT: f64 = 1.0;

#[derive(Debug)]
struct SupplyState {
    voltage: f64,
    current_limit: f64,
    output: bool,
    errors: ErrorQueue,
}

impl Default for SupplyState {
    fn default() -> Self {
        Self {
            voltage: 0.0,
            current_limit: DEFAULT_CURRENT_LIMIT,
            output: false,
            errors: ErrorQueue::default(),
        }
    }
}

impl SupplyState {
    /// Output voltage and current with constant-current limiting.
    fn operating_point(&self) -> (f64, f64) {
        if !self.output {
            return (0.0, 0.0);
        }
        let current = self.voltage / LOAD_OHMS;
        if current > self.current_limit {
            (self.current_limit * LOAD_OHMS, self.current_limit)
        } else {
            (self.voltage, current)
        }
    }
}

pub struct PowerSupply {
    identity: Identity,
    max_voltage: f64,
    state: Mutex<SupplyState>,
}

impl PowerSupply {
    pub fn new(max_voltage: f64) -> PowerSupply {
        PowerSupply {
            identity: Identity::new("LXI-RS", "SIM-PSU1", "SIM000002", "0.1.0"),
            max_voltage,
            state: Mutex::new(SupplyState::default()),
        }
    }
}

fn set_within(command: &Command, max: f64, errors: &mut ErrorQueue, target: &mut f64) {
    match command.number() {
        Some(value) if (0.0..=max).contains(&value) => *target = value,
        Some(value) => {
            log::warn!("{} {} is out of range", command.header(), value);
            errors.push(OUT_OF_RANGE);
        }
        None => errors.push(ILLEGAL_PARAMETER),
    }
}

impl ScpiInstrument for PowerSupply {
    fn handle(&self, line: &str) -> Response {
        let command = Command::parse(line);
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;
        if let Some(response) = handle_common(&command, &self.identity, &mut state.errors) {
            return response;
        }

        match command.header() {
            "*RST" => {
                *state = SupplyState::default();
                Response::None
            }
            "VOLT" | "VOLTAGE" => {
                set_within(&command, self.max_voltage, &mut state.errors, &mut state.voltage);
                Response::None
            }
            "VOLT?" | "VOLTAGE?" => Response::line(format!("{:.3}", state.voltage)),
            "CURR" | "CURRENT" => {
                set_within(&command, MAX_CURRENT, &mut state.errors, &mut state.current_limit);
                Response::None
            }
            "CURR?" | "CURRENT?" => Response::line(format!("{:.3}", state.current_limit)),
            "OUTP" | "OUTPUT" => {
                match command.switch() {
                    Some(on) => state.output = on,
                    None => state.errors.push(ILLEGAL_PARAMETER),
                }
                Response::None
            }
            "OUTP?" | "OUTPUT?" => Response::line(if state.output { "1" } else { "0" }),
            "MEAS:VOLT?" | "MEASURE:VOLTAGE?" => {
                Response::line(format!("{:.3}", state.operating_point().0))
            }
            "MEAS:CURR?" | "MEASURE:CURRENT?" => {
                Response::line(format!("{:.3}", state.operating_point().1))
            }
            "MEAS:POW?" | "MEASURE:POWER?" => {
                let (voltage, current) = state.operating_point();
                Response::line(format!("{:.3}", voltage * current))
            }
            _ => {
                log::warn!("Undefined header {:?}", line);
                state.errors.push(UNDEFINED_HEADER);
                Response::None
            }
        }
    }
}
