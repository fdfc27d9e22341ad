//! # Simulated Oscilloscope
//!
//! Four channels, each showing a sine wave whose amplitude in volts equals
//! the channel number. Waveforms are served as one-byte-per-sample
//! definite-length blocks described by a Rigol-style preamble, and the
//! screen as a bitmap wrapped in a block header.
use std::{
    f64::consts::PI,
    io::Cursor,
    sync::{Mutex, PoisonError},
};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lxi_protocol::Identity;
use lxi_server::{Response, ScpiInstrument};

use super::{
    Command, ErrorQueue, ILLEGAL_PARAMETER, SETTINGS_CONFLICT, UNDEFINED_HEADER, handle_common,
};

const CHANNELS: usize = 4;
const Y_INCREMENT: f64 = 0.04;
const Y_REFERENCE: f64 = 128.0;
const PERIODS_ON_SCREEN: f64 = 4.0;
const SCREEN_WIDTH: u32 = 320;
const SCREEN_HEIGHT: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Byte,
    Word,
    Ascii,
}

#[derive(Debug)]
struct ScopeState {
    channel: usize,
    format: Format,
    running: bool,
    errors: ErrorQueue,
}

impl Default for ScopeState {
    fn default() -> Self {
        Self {
            channel: 1,
            format: Format::Byte,
            running: true,
            errors: ErrorQueue::default(),
        }
    }
}

pub struct Oscilloscope {
    identity: Identity,
    points: usize,
    frequency: f64,
    state: Mutex<ScopeState>,
}

fn parse_channel(argument: &str) -> Option<usize> {
    let argument = argument.to_ascii_uppercase();
    let number = argument
        .strip_prefix("CHANNEL")
        .or_else(|| argument.strip_prefix("CHAN"))?;
    number
        .parse::<usize>()
        .ok()
        .filter(|channel| (1..=CHANNELS).contains(channel))
}

impl Oscilloscope {
    pub fn new(points: usize, frequency: f64) -> Oscilloscope {
        Oscilloscope {
            identity: Identity::new("LXI-RS", "SIM-SCOPE4", "SIM000001", "0.1.0"),
            points: points.max(1),
            frequency,
            state: Mutex::new(ScopeState::default()),
        }
    }

    fn x_increment(&self) -> f64 {
        PERIODS_ON_SCREEN / self.frequency / self.points as f64
    }

    /// The trigger point sits in the middle of the screen.
    fn x_origin(&self) -> f64 {
        -(self.points as f64) / 2.0 * self.x_increment()
    }

    fn preamble(&self) -> String {
        format!(
            "0,0,{},1,{:e},{:e},0,{:e},0,{}",
            self.points,
            self.x_increment(),
            self.x_origin(),
            Y_INCREMENT,
            Y_REFERENCE
        )
    }

    fn samples(&self, channel: usize) -> Vec<u8> {
        let amplitude = channel as f64;
        (0..self.points)
            .map(|index| {
                let time = self.x_origin() + index as f64 * self.x_increment();
                let volts = amplitude * (2.0 * PI * self.frequency * time).sin();
                (Y_REFERENCE + volts / Y_INCREMENT).round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    fn screenshot(&self, channel: usize) -> Vec<u8> {
        let mut screen = RgbImage::new(SCREEN_WIDTH, SCREEN_HEIGHT);
        let samples = self.samples(channel);
        for x in 0..SCREEN_WIDTH {
            let index = x as usize * samples.len() / SCREEN_WIDTH as usize;
            let y = (255 - u32::from(samples[index])) * (SCREEN_HEIGHT - 1) / 255;
            screen.put_pixel(x, y, Rgb([255, 255, 0]));
            screen.put_pixel(x, SCREEN_HEIGHT / 2, Rgb([64, 64, 64]));
        }

        let mut bitmap = Vec::new();
        let encoded = DynamicImage::ImageRgb8(screen)
            .write_to(&mut Cursor::new(&mut bitmap), ImageFormat::Bmp);
        if let Err(e) = encoded {
            log::error!("Failed to encode screenshot: {}", e);
            bitmap.clear();
        }
        bitmap
    }
}

impl ScpiInstrument for Oscilloscope {
    fn handle(&self, line: &str) -> Response {
        let command = Command::parse(line);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(response) = handle_common(&command, &self.identity, &mut state.errors) {
            return response;
        }

        match command.header() {
            "*RST" => {
                *state = ScopeState::default();
                Response::None
            }
            "RUN" => {
                state.running = true;
                Response::None
            }
            "STOP" | "SING" | "SINGLE" => {
                state.running = false;
                Response::None
            }
            "TRIG:STAT?" | "TRIGGER:STATUS?" => {
                Response::line(if state.running { "RUN" } else { "STOP" })
            }
            "WAV:SOUR" | "WAVEFORM:SOURCE" => {
                match command.argument().and_then(parse_channel) {
                    Some(channel) => state.channel = channel,
                    None => state.errors.push(ILLEGAL_PARAMETER),
                }
                Response::None
            }
            "WAV:SOUR?" | "WAVEFORM:SOURCE?" => Response::line(format!("CHAN{}", state.channel)),
            "WAV:MODE" | "WAVEFORM:MODE" => Response::None,
            "WAV:FORM" | "WAVEFORM:FORMAT" => {
                let format = command.argument().map(str::to_ascii_uppercase);
                match format.as_deref() {
                    Some("BYTE") => state.format = Format::Byte,
                    Some("WORD") => state.format = Format::Word,
                    Some("ASC" | "ASCII") => state.format = Format::Ascii,
                    _ => state.errors.push(ILLEGAL_PARAMETER),
                }
                Response::None
            }
            "WAV:FORM?" | "WAVEFORM:FORMAT?" => Response::line(match state.format {
                Format::Byte => "BYTE",
                Format::Word => "WORD",
                Format::Ascii => "ASC",
            }),
            "WAV:PRE?" | "WAVEFORM:PREAMBLE?" => Response::line(self.preamble()),
            "WAV:DATA?" | "WAVEFORM:DATA?" => {
                if state.format != Format::Byte {
                    log::warn!("Only BYTE waveforms are simulated");
                    state.errors.push(SETTINGS_CONFLICT);
                    return Response::None;
                }
                Response::block(&self.samples(state.channel))
            }
            "DISP:DATA?" | "DISPLAY:DATA?" => Response::block(&self.screenshot(state.channel)),
            "MEAS:FREQ?" | "MEASURE:FREQUENCY?" => Response::line(format!("{:e}", self.frequency)),
            "MEAS:VPP?" | "MEASURE:VPP?" => {
                let channel = match command.argument() {
                    Some(argument) => match parse_channel(argument) {
                        Some(channel) => channel,
                        None => {
                            state.errors.push(ILLEGAL_PARAMETER);
                            return Response::None;
                        }
                    },
                    None => state.channel,
                };
                Response::line(format!("{:e}", 2.0 * channel as f64))
            }
            _ => {
                log::warn!("Undefined header {:?}", line);
                state.errors.push(UNDEFINED_HEADER);
                Response::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lxi_protocol::{Preamble, block::block_payload, block::find_bitmap_start};

    fn raw(response: Response) -> Vec<u8> {
        match response {
            Response::Raw(bytes) => bytes.to_vec(),
            other => panic!("expected raw response, got {:?}", other),
        }
    }

    #[test]
    fn preamble_scales_served_block() {
        let scope = Oscilloscope::new(1000, 1000.0);
        scope.handle(":WAV:SOUR CHAN2");
        let text = raw(scope.handle(":WAV:PRE?"));
        let preamble = Preamble::parse(std::str::from_utf8(&text).unwrap()).unwrap();
        let block = raw(scope.handle(":WAV:DATA?"));
        let waveform = preamble.decode(block_payload(&block).unwrap().unwrap());

        assert_eq!(waveform.len(), 1000);
        let peak = waveform.values().fold(f64::MIN, f64::max);
        assert!((peak - 2.0).abs() < 0.05, "peak was {peak}");
        let first = waveform.times().next().unwrap();
        assert!((first + 2e-3).abs() < 1e-9, "first sample at {first}");
    }

    #[test]
    fn non_byte_format_is_refused() {
        let scope = Oscilloscope::new(10, 1000.0);
        scope.handle(":WAV:FORM WORD");
        assert_eq!(scope.handle(":WAV:DATA?"), Response::None);
        assert_eq!(
            scope.handle("SYST:ERR?"),
            Response::line(SETTINGS_CONFLICT)
        );
    }

    #[test]
    fn invalid_source_is_queued() {
        let scope = Oscilloscope::new(10, 1000.0);
        scope.handle(":WAV:SOUR CHAN9");
        assert_eq!(scope.handle(":WAV:SOUR?"), Response::line("CHAN1"));
        assert_eq!(
            scope.handle("SYST:ERR?"),
            Response::line(ILLEGAL_PARAMETER)
        );
    }

    #[test]
    fn screenshot_is_a_bitmap_behind_a_header() {
        let scope = Oscilloscope::new(100, 1000.0);
        let reply = raw(scope.handle(":DISP:DATA? ON,OFF,BMP"));
        assert_eq!(reply[0], b'#');
        let start = find_bitmap_start(&reply).unwrap();
        let image = image::load_from_memory_with_format(&reply[start..], ImageFormat::Bmp)
            .unwrap();
        assert_eq!(image.width(), SCREEN_WIDTH);
        assert_eq!(image.height(), SCREEN_HEIGHT);
    }

    #[test]
    fn reset_restores_defaults() {
        let scope = Oscilloscope::new(10, 1000.0);
        scope.handle(":WAV:SOUR CHAN3");
        scope.handle(":STOP");
        assert_eq!(scope.handle(":TRIG:STAT?"), Response::line("STOP"));
        scope.handle("*RST");
        assert_eq!(scope.handle(":WAV:SOUR?"), Response::line("CHAN1"));
        assert_eq!(scope.handle(":TRIG:STAT?"), Response::line("RUN"));
    }
}
