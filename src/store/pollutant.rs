//! Pollutant parameter catalogue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unknown pollutant parameter code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown pollutant parameter '{0}'")]
pub struct UnknownPollutant(pub String);

/// Criteria pollutants reported by monitoring stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pollutant {
    /// Fine particulate matter (≤ 2.5 µm).
    Pm25,
    /// Coarse particulate matter (≤ 10 µm).
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
    ];

    /// Parameter code used in measurement feeds.
    pub fn code(self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::O3 => "o3",
            Pollutant::No2 => "no2",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
        }
    }

    /// Customary reporting unit.
    pub fn unit(self) -> &'static str {
        match self {
            Pollutant::Pm25 | Pollutant::Pm10 => "µg/m³",
            Pollutant::O3 | Pollutant::Co => "ppm",
            Pollutant::No2 | Pollutant::So2 => "ppb",
        }
    }

    /// EPA AQS parameter code.
    pub fn aqs_code(self) -> u32 {
        match self {
            Pollutant::Pm25 => 88101,
            Pollutant::Pm10 => 81102,
            Pollutant::O3 => 44201,
            Pollutant::No2 => 42602,
            Pollutant::So2 => 42401,
            Pollutant::Co => 42101,
        }
    }

    pub fn from_aqs_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.aqs_code() == code)
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Pollutant {
    type Err = UnknownPollutant;

    /// Accepts the feed codes plus the dotted spellings `pm2.5` and `pm2_5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pm25" | "pm2.5" | "pm2_5" => Ok(Pollutant::Pm25),
            "pm10" => Ok(Pollutant::Pm10),
            "o3" => Ok(Pollutant::O3),
            "no2" => Ok(Pollutant::No2),
            "so2" => Ok(Pollutant::So2),
            "co" => Ok(Pollutant::Co),
            _ => Err(UnknownPollutant(s.to_string())),
        }
    }
}
