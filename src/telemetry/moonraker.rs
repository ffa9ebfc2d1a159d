//! Blocking Moonraker HTTP adapter.
//!
//! Polls `/printer/objects/query` for the handful of Klipper objects the panel
//! cares about and folds the answer onto the previous snapshot, so objects
//! missing from a response keep their last-known values.

use super::{
    display_filename, remaining_from, Heater, PrintAction, PrintState, PrinterControl,
    PrinterSnapshot, TelemetrySource,
};
use crate::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

const QUERY_OBJECTS: &str =
    "extruder&heater_bed&print_stats&display_status&toolhead&fan&gcode_move&virtual_sdcard";

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    result: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    status: StatusObjects,
}

/// Subset of Klipper object status used by the bridge. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct StatusObjects {
    extruder: Option<HeaterStatus>,
    heater_bed: Option<HeaterStatus>,
    print_stats: Option<PrintStats>,
    display_status: Option<Progress>,
    virtual_sdcard: Option<Progress>,
    toolhead: Option<Toolhead>,
    fan: Option<Fan>,
    gcode_move: Option<GcodeMove>,
}

#[derive(Debug, Deserialize)]
struct HeaterStatus {
    temperature: Option<f64>,
    target: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PrintStats {
    state: Option<String>,
    filename: Option<String>,
    print_duration: Option<f64>,
    info: Option<PrintInfo>,
}

#[derive(Debug, Deserialize)]
struct PrintInfo {
    current_layer: Option<u32>,
    total_layer: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Progress {
    progress: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Toolhead {
    position: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct Fan {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GcodeMove {
    speed_factor: Option<f64>,
    extrude_factor: Option<f64>,
}

/// Decode a `/printer/objects/query` body.
pub fn parse_query_response(body: &str) -> Result<StatusObjects> {
    let envelope: QueryEnvelope = serde_json::from_str(body)
        .map_err(|e| Error::Telemetry(format!("invalid moonraker response: {e}")))?;
    Ok(envelope.result.status)
}

/// Fold a status response onto the previous snapshot.
pub fn merge_status(prev: &PrinterSnapshot, status: &StatusObjects) -> PrinterSnapshot {
    let mut next = prev.clone();

    if let Some(heater) = &status.extruder {
        next.hotend.current = heater.temperature.unwrap_or(prev.hotend.current);
        next.hotend.target = heater.target.unwrap_or(prev.hotend.target);
    }
    if let Some(heater) = &status.heater_bed {
        next.bed.current = heater.temperature.unwrap_or(prev.bed.current);
        next.bed.target = heater.target.unwrap_or(prev.bed.target);
    }
    if let Some(stats) = &status.print_stats {
        if let Some(state) = &stats.state {
            next.state = PrintState::from_klipper(state);
        }
        if let Some(filename) = &stats.filename {
            next.filename = display_filename(filename);
        }
        if let Some(duration) = stats.print_duration.filter(|d| d.is_finite() && *d >= 0.0) {
            next.elapsed_secs = duration as u64;
        }
        if let Some(info) = &stats.info {
            next.current_layer = info.current_layer;
            next.total_layers = info.total_layer;
        }
    }

    let ratio = status
        .display_status
        .as_ref()
        .and_then(|d| d.progress)
        .or_else(|| status.virtual_sdcard.as_ref().and_then(|v| v.progress));
    if let Some(ratio) = ratio.filter(|r| r.is_finite()) {
        next.progress = (ratio * 100.0).clamp(0.0, 100.0);
    }

    if let Some(position) = status.toolhead.as_ref().and_then(|t| t.position.as_ref()) {
        if let [x, y, z, ..] = position.as_slice() {
            next.position.x = *x;
            next.position.y = *y;
            next.position.z = *z;
        }
    }
    if let Some(speed) = status.fan.as_ref().and_then(|f| f.speed) {
        next.fan_percent = ratio_to_percent(speed).min(100) as u8;
    }
    if let Some(gcode_move) = &status.gcode_move {
        if let Some(factor) = gcode_move.speed_factor {
            next.speed_factor = ratio_to_percent(factor);
        }
        if let Some(factor) = gcode_move.extrude_factor {
            next.flow_factor = ratio_to_percent(factor);
        }
    }

    next.remaining_secs = remaining_from(next.elapsed_secs, next.progress);
    next
}

fn ratio_to_percent(ratio: f64) -> u16 {
    if !ratio.is_finite() {
        return 0;
    }
    (ratio * 100.0).round().clamp(0.0, u16::MAX as f64) as u16
}

/// Moonraker endpoint plus the last snapshot it produced.
#[derive(Debug, Clone)]
pub struct MoonrakerClient {
    base_url: String,
    http: reqwest::blocking::Client,
    last: PrinterSnapshot,
}

impl MoonrakerClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let host = host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(Error::InvalidArgs("moonraker host cannot be empty".into()));
        }
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}:{port}")
        } else {
            format!("http://{host}:{port}")
        };
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url,
            http,
            last: PrinterSnapshot::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str, query: &[(&str, &str)]) -> Result<()> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.post(&url).query(query).send()?;
        if !response.status().is_success() {
            return Err(Error::Telemetry(format!(
                "moonraker returned HTTP {} for {path}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl TelemetrySource for MoonrakerClient {
    fn fetch(&mut self) -> Result<PrinterSnapshot> {
        let url = format!("{}/printer/objects/query?{QUERY_OBJECTS}", self.base_url);
        let response = self.http.get(&url).send()?;
        if !response.status().is_success() {
            return Err(Error::Telemetry(format!(
                "moonraker returned HTTP {}",
                response.status()
            )));
        }
        let body = response.text()?;
        let status = parse_query_response(&body)?;
        self.last = merge_status(&self.last, &status);
        Ok(self.last.clone())
    }
}

impl PrinterControl for MoonrakerClient {
    fn set_target_temperature(&self, heater: Heater, value: f64) -> Result<()> {
        let script = format!(
            "SET_HEATER_TEMPERATURE HEATER={} TARGET={value}",
            heater.klipper_name()
        );
        self.run_gcode(&script)
    }

    fn print_control(&self, action: PrintAction) -> Result<()> {
        self.post(&format!("/printer/print/{}", action.as_str()), &[])
    }

    fn run_gcode(&self, script: &str) -> Result<()> {
        self.post("/printer/gcode/script", &[("script", script)])
    }
}
