//! Waveform preamble and sample scaling.
use crate::error::ProtocolError;

/// Scale and offset metadata describing how raw sample bytes map to time and
/// voltage. Only valid for the block read immediately after it was fetched.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Preamble {
    pub points: usize,
    pub x_increment: f64,
    pub x_origin: f64,
    pub x_reference: f64,
    pub y_increment: f64,
    pub y_origin: f64,
    pub y_reference: f64,
}

const PREAMBLE_FIELDS: usize = 10;

fn field(fields: &[&str], index: usize, name: &str) -> Result<f64, ProtocolError> {
    fields[index]
        .parse::<f64>()
        .map_err(|_| ProtocolError::InvalidPreamble(format!("{name} is {:?}", fields[index])))
}

impl Preamble {
    /// Parses `format,type,points,count,xinc,xorigin,xref,yinc,yorigin,yref`.
    pub fn parse(reply: &str) -> Result<Preamble, ProtocolError> {
        let fields: Vec<&str> = reply.trim().split(',').map(str::trim).collect();
        if fields.len() != PREAMBLE_FIELDS {
            return Err(ProtocolError::InvalidPreamble(format!(
                "Expected {} fields, got {}",
                PREAMBLE_FIELDS,
                fields.len()
            )));
        }
        let points = field(&fields, 2, "points")?;
        if !points.is_finite() || points < 0.0 {
            return Err(ProtocolError::InvalidPreamble(format!(
                "points is {points}"
            )));
        }
        Ok(Preamble {
            points: points as usize,
            x_increment: field(&fields, 4, "x increment")?,
            x_origin: field(&fields, 5, "x origin")?,
            x_reference: field(&fields, 6, "x reference")?,
            y_increment: field(&fields, 7, "y increment")?,
            y_origin: field(&fields, 8, "y origin")?,
            y_reference: field(&fields, 9, "y reference")?,
        })
    }

    /// Physical value of one raw sample byte.
    pub fn scale(&self, raw: u8) -> f64 {
        (f64::from(raw) - (self.y_reference + self.y_origin)) * self.y_increment
    }

    /// Time coordinate of the sample at `index`.
    pub fn time_at(&self, index: usize) -> f64 {
        self.x_origin + index as f64 * self.x_increment
    }

    /// Converts a raw one-byte-per-sample block into a waveform.
    pub fn decode(&self, raw: &[u8]) -> Waveform {
        if self.points != 0 && self.points != raw.len() {
            log::warn!(
                "Preamble announces {} points but the block holds {}",
                self.points,
                raw.len()
            );
        }
        let samples = raw
            .iter()
            .enumerate()
            .map(|(index, byte)| Sample {
                time: self.time_at(index),
                value: self.scale(*byte),
            })
            .collect();
        Waveform {
            preamble: *self,
            samples,
        }
    }
}

/// One decoded point of a waveform.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

/// Samples decoded from one block together with the preamble that scaled them.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    preamble: Preamble,
    samples: Vec<Sample>,
}

impl Waveform {
    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.time)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }
}
