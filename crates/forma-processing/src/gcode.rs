//! G-code print duration estimation
//!
//! Walks a toolpath line by line and simulates head motion with a single fixed
//! acceleration. For each `G1` move the feed rate ramps from the previous to the
//! new value; the distance spent ramping is
//!
//! ```text
//! accel_distance = |(f_prev + f) * (f - f_prev) / ACCELERATION|
//! ```
//!
//! The absolute value is deliberate: slowing down is charged like speeding up, so a
//! drop in feed rate never yields a negative ramp distance.
//!
//! If the ramp fits inside the move (and both rates are usable) the move takes
//! `2 * accel_distance / (f_prev + f)` for the ramp plus `(travel - accel_distance) / f`
//! at cruise speed; otherwise it takes `sqrt(2 * accel_distance / ACCELERATION)`.
//! `G4 P<ms>` dwells add `P / 1000` seconds. Each increase of Z counts as a layer.
//!
//! The result depends only on the input text.

use serde::Serialize;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::ProcessingError;

/// Head acceleration in mm/s².
pub const ACCELERATION: f64 = 1500.0;

/// Outcome of simulating one toolpath.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GcodeEstimate {
    pub layer_count: u32,
    pub duration_secs: f64,
    /// Extruded filament length derived from E positions, honoring `G92 E` resets.
    pub filament_mm: f64,
}

impl GcodeEstimate {
    /// `"{layers} layers, H:MM:SS"`
    pub fn summary(&self) -> String {
        let total = self.duration_secs.max(0.0).round() as u64;
        format!(
            "{} layers, {}:{:02}:{:02}",
            self.layer_count,
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }
}

/// Incremental estimator; feed it lines in file order.
#[derive(Debug, Clone, Default)]
pub struct GcodeEstimator {
    x: f64,
    y: f64,
    z: f64,
    e: f64,
    f: f64,
    relative_e: bool,
    e_origin: f64,
    filament_mm: f64,
    layer_count: u32,
    duration_secs: f64,
    line_number: usize,
}

impl GcodeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate a toolpath held in memory.
    pub fn estimate_str(gcode: &str) -> Result<GcodeEstimate, ProcessingError> {
        let mut estimator = Self::new();
        for line in gcode.lines() {
            estimator.feed_line(line)?;
        }
        Ok(estimator.finish())
    }

    /// Estimate a toolpath file, streaming it line by line.
    #[tracing::instrument]
    pub async fn estimate_file(path: &Path) -> Result<GcodeEstimate, ProcessingError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ProcessingError::ToolpathEstimationFailed(e.to_string()))?;
        let mut lines = BufReader::new(file).lines();
        let mut estimator = Self::new();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ProcessingError::ToolpathEstimationFailed(e.to_string()))?
        {
            estimator.feed_line(&line)?;
        }

        let estimate = estimator.finish();
        tracing::debug!(
            layer_count = estimate.layer_count,
            duration_secs = estimate.duration_secs,
            "Toolpath estimated"
        );
        Ok(estimate)
    }

    pub fn feed_line(&mut self, line: &str) -> Result<(), ProcessingError> {
        self.line_number += 1;

        let code = line.split(';').next().unwrap_or("").trim();
        let mut words = code.split_whitespace().peekable();
        // Optional line number prefix
        if words
            .peek()
            .map(|word| word.starts_with('N') || word.starts_with('n'))
            .unwrap_or(false)
        {
            words.next();
        }
        let command = match words.next() {
            Some(command) => command.to_ascii_uppercase(),
            None => return Ok(()),
        };

        match command.as_str() {
            "G1" | "G01" => {
                let params = self.parse_params(words)?;
                self.linear_move(&params);
            }
            "G4" | "G04" => {
                if let Some(millis) = self.parse_params(words)?.get('P') {
                    self.duration_secs += millis / 1000.0;
                }
            }
            "G92" => {
                if let Some(e) = self.parse_params(words)?.get('E') {
                    if !self.relative_e {
                        self.filament_mm += self.e - self.e_origin;
                    }
                    self.e = e;
                    self.e_origin = e;
                }
            }
            "M82" => self.relative_e = false,
            "M83" => self.relative_e = true,
            _ => {}
        }
        Ok(())
    }

    pub fn finish(mut self) -> GcodeEstimate {
        if !self.relative_e {
            self.filament_mm += self.e - self.e_origin;
        }
        GcodeEstimate {
            layer_count: self.layer_count,
            duration_secs: self.duration_secs,
            filament_mm: self.filament_mm,
        }
    }

    fn linear_move(&mut self, params: &Params) {
        let x = params.get('X').unwrap_or(self.x);
        let y = params.get('Y').unwrap_or(self.y);
        let z = params.get('Z').unwrap_or(self.z);
        let f = params.get('F').map(|f| f / 60.0).unwrap_or(self.f);

        let travel = ((x - self.x).powi(2) + (y - self.y).powi(2) + (z - self.z).powi(2)).sqrt();
        let accel_distance = ((self.f + f) * (f - self.f) / ACCELERATION).abs();

        let move_secs = if accel_distance <= travel && self.f + f != 0.0 && f != 0.0 {
            2.0 * accel_distance / (self.f + f) + (travel - accel_distance) / f
        } else {
            (2.0 * accel_distance / ACCELERATION).sqrt()
        };
        self.duration_secs += move_secs;

        if z > self.z {
            self.layer_count += 1;
        }

        if let Some(e) = params.get('E') {
            if self.relative_e {
                self.filament_mm += e;
            } else {
                self.e = e;
            }
        }

        self.x = x;
        self.y = y;
        self.z = z;
        self.f = f;
    }

    fn parse_params<'a>(
        &self,
        words: impl Iterator<Item = &'a str>,
    ) -> Result<Params, ProcessingError> {
        let mut params = Params::default();
        for word in words {
            let mut chars = word.chars();
            let letter = match chars.next() {
                Some(letter) if letter.is_ascii_alphabetic() => letter.to_ascii_uppercase(),
                _ => continue,
            };
            let raw = chars.as_str();
            if raw.is_empty() {
                continue;
            }
            let value = raw.parse::<f64>().map_err(|_| {
                ProcessingError::ToolpathEstimationFailed(format!(
                    "line {}: invalid parameter {:?}",
                    self.line_number, word
                ))
            })?;
            params.set(letter, value);
        }
        Ok(params)
    }
}

/// Parameters of one instruction, by upper-case letter.
#[derive(Default)]
struct Params {
    values: Vec<(char, f64)>,
}

impl Params {
    fn set(&mut self, letter: char, value: f64) {
        match self.values.iter_mut().find(|(l, _)| *l == letter) {
            Some(slot) => slot.1 = value,
            None => self.values.push((letter, value)),
        }
    }

    fn get(&self, letter: char) -> Option<f64> {
        self.values
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, value)| *value)
    }
}
