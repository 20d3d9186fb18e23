use chrono::{DateTime, NaiveDateTime, SubsecRound as _, TimeZone};
use serde::{Deserialize, Serialize};

use crate::sen5x::Readings;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(with = "timestamp")]
    pub timestamp: NaiveDateTime,

    pub pm1p0: f32,

    pub pm2p5: f32,

    pub pm4p0: f32,

    pub pm10p0: f32,

    pub voc: f32,

    pub nox: f32,

    pub temperature: f32,

    pub humidity: f32,
}

impl Measurement {
    /// Stamps decoded readings with local wall-clock time, truncated to whole
    /// seconds so the value survives a trip through the snapshot file.
    pub fn new<Tz: TimeZone>(measured_at: DateTime<Tz>, readings: Readings) -> Self {
        Self {
            timestamp: measured_at.naive_local().trunc_subsecs(0),
            pm1p0: readings.pm1p0,
            pm2p5: readings.pm2p5,
            pm4p0: readings.pm4p0,
            pm10p0: readings.pm10p0,
            voc: readings.voc,
            nox: readings.nox,
            temperature: readings.temperature,
            humidity: readings.humidity,
        }
    }

    pub fn readings(&self) -> Readings {
        Readings {
            pm1p0: self.pm1p0,
            pm2p5: self.pm2p5,
            pm4p0: self.pm4p0,
            pm10p0: self.pm10p0,
            voc: self.voc,
            nox: self.nox,
            temperature: self.temperature,
            humidity: self.humidity,
        }
    }
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize as _, Deserializer, Serializer, de::Error as _};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(v: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&v.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
            .map_err(|e| D::Error::custom(format!("invalid timestamp {s:?}: {e}")))
    }
}
