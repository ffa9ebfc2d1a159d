use crate::telemetry::PrinterSnapshot;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Display firmware family, fixed for a connection once chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// MKS firmware: plain replies, no capability block.
    Terse,
    /// BIGTREETECH firmware: bare `ok` ahead of replies, capability announcing.
    OkPrefixed,
    /// BIGTREETECH firmware in RepRapFirmware mode: no `@:` power fields.
    NoPower,
}

/// Formatting knobs for one dialect.
#[derive(Debug)]
pub struct DialectProfile {
    pub name: &'static str,
    pub temperature_prefix: &'static str,
    pub power_fields: bool,
    pub immediate_ok: bool,
    pub firmware: Option<&'static str>,
    pub capabilities: &'static [&'static str],
    pub action_prefix: &'static str,
}

pub const ACKNOWLEDGEMENT: &str = "ok";

const TERSE: DialectProfile = DialectProfile {
    name: "terse",
    temperature_prefix: "",
    power_fields: true,
    immediate_ok: false,
    firmware: Some("FIRMWARE_NAME:MKS-TFT FIRMWARE_VERSION:2.0.6"),
    capabilities: &[],
    action_prefix: "//action:",
};

const OK_PREFIXED: DialectProfile = DialectProfile {
    name: "ok-prefixed",
    temperature_prefix: "ok ",
    power_fields: true,
    immediate_ok: true,
    firmware: Some("FIRMWARE_NAME:Klipper HOST_ACTION_COMMANDS:1 EXTRUDER_COUNT:1"),
    capabilities: &[
        "Cap:EEPROM:1",
        "Cap:AUTOREPORT_TEMP:1",
        "Cap:HOST_ACTION_COMMANDS:1",
        "Cap:PROMPT_SUPPORT:1",
    ],
    action_prefix: "//action:",
};

const NO_POWER: DialectProfile = DialectProfile {
    name: "no-power",
    temperature_prefix: "",
    power_fields: false,
    immediate_ok: false,
    firmware: Some(
        "FIRMWARE_NAME: RepRapFirmware for Generic FIRMWARE_VERSION: 3.4.0 \
         ELECTRONICS: Generic FIRMWARE_DATE: 2023-01-01",
    ),
    capabilities: &[
        "Cap:EEPROM:0",
        "Cap:AUTOREPORT_TEMP:1",
        "Cap:HOST_ACTION_COMMANDS:1",
        "Cap:PROMPT_SUPPORT:1",
        "Cap:AUTOLEVEL:1",
        "Cap:RUNOUT:0",
        "Cap:Z_PROBE:1",
        "Cap:LEVELING_DATA:1",
        "Cap:BUILD_PERCENT:1",
        "Cap:SOFTWARE_POWER:0",
        "Cap:TOGGLE_LIGHTS:0",
        "Cap:CASE_LIGHT_BRIGHTNESS:0",
        "Cap:EMERGENCY_PARSER:1",
    ],
    action_prefix: "M118 P0 A1 action:",
};

impl Dialect {
    pub fn profile(&self) -> &'static DialectProfile {
        match self {
            Dialect::Terse => &TERSE,
            Dialect::OkPrefixed => &OK_PREFIXED,
            Dialect::NoPower => &NO_POWER,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.profile().name
    }

    /// Whether every non-temperature reply is preceded by a bare `ok`.
    pub fn immediate_ok(&self) -> bool {
        self.profile().immediate_ok
    }

    /// Temperature fields without any acknowledgement token.
    pub fn temperature_report(&self, snapshot: &PrinterSnapshot) -> String {
        let mut line = format!(
            "T:{:.1} /{:.1} B:{:.1} /{:.1}",
            snapshot.hotend.current,
            snapshot.hotend.target,
            snapshot.bed.current,
            snapshot.bed.target
        );
        if self.profile().power_fields {
            line.push_str(" @:0 B@:0");
        }
        line
    }

    /// Reply to a temperature query, carrying the acknowledgement where the dialect wants it.
    pub fn temperature_reply(&self, snapshot: &PrinterSnapshot) -> String {
        format!(
            "{}{}",
            self.profile().temperature_prefix,
            self.temperature_report(snapshot)
        )
    }

    pub fn firmware_lines(&self) -> Vec<String> {
        let profile = self.profile();
        profile
            .firmware
            .into_iter()
            .chain(profile.capabilities.iter().copied())
            .map(str::to_string)
            .collect()
    }

    /// Opening sequence: temperature, firmware identity, capabilities, `ok`.
    pub fn handshake(&self, snapshot: &PrinterSnapshot) -> Vec<String> {
        let mut lines = vec![self.temperature_reply(snapshot)];
        lines.extend(self.firmware_lines());
        lines.push(ACKNOWLEDGEMENT.to_string());
        lines
    }

    pub fn host_action(&self, action: &str) -> String {
        format!("{}{action}", self.profile().action_prefix)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terse" | "mks" => Ok(Dialect::Terse),
            "ok-prefixed" | "btt" | "bigtreetech" => Ok(Dialect::OkPrefixed),
            "no-power" | "rrf" => Ok(Dialect::NoPower),
            other => Err(format!(
                "unknown dialect '{other}' (expected terse, ok-prefixed or no-power)"
            )),
        }
    }
}

/// Configured dialect policy: detect on connect, or force a preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DialectSetting {
    #[default]
    Auto,
    Fixed(Dialect),
}

impl FromStr for DialectSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(DialectSetting::Auto);
        }
        s.parse().map(DialectSetting::Fixed).map_err(|_| {
            format!("unknown dialect '{s}' (expected auto, terse, ok-prefixed or no-power)")
        })
    }
}

impl fmt::Display for DialectSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectSetting::Auto => f.write_str("auto"),
            DialectSetting::Fixed(dialect) => f.write_str(dialect.as_str()),
        }
    }
}

impl TryFrom<String> for DialectSetting {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DialectSetting> for String {
    fn from(value: DialectSetting) -> Self {
        value.to_string()
    }
}
