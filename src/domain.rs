//! ==============================================================================
//! domain.rs - sensor identity registry and reading types
//! ==============================================================================
//!
//! purpose:
//!     the closed set of sensor channels published on the broker, their
//!     display metadata, and the value types shared by the decoder, the
//!     state store and the persistence bridge.
//!
//! relationships:
//!     - used by: decode.rs, store.rs, persist.rs, transport.rs, server.rs
//!     - wire names match the topic suffix `sensorestcc/<id>` and the keys of
//!       the persisted json maps
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

// ==============================================================================
// sensor identity registry
// ==============================================================================

/// one physical or logical sensor channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensorId {
    FrequenciaRespiratoria,
    BatimentosCardiacos,
    Saturacao,
    TemperaturaCorporal,
    TemperaturaAmbiente,
    TemperaturaOximetro,
    #[serde(rename = "qualidade-ar-pm25")]
    QualidadeArPm25,
    #[serde(rename = "qualidade-ar-pm10")]
    QualidadeArPm10,
    QualidadeArAqi,
    #[serde(rename = "qualidade-ar-o3")]
    QualidadeArO3,
    #[serde(rename = "qualidade-ar-no2")]
    QualidadeArNo2,
    #[serde(rename = "qualidade-ar-so2")]
    QualidadeArSo2,
    Piezo,
    ContagemTosse,
    Som,
    Umidade,
    AcelerometroX,
    AcelerometroY,
    AcelerometroZ,
    GiroscopioX,
    GiroscopioY,
    GiroscopioZ,
}

/// display metadata for a sensor channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SensorMeta {
    pub label: &'static str,
    /// may be empty for unitless channels
    pub unit: &'static str,
}

impl SensorId {
    /// every known identifier, in registry order
    pub const ALL: [SensorId; 22] = [
        SensorId::FrequenciaRespiratoria,
        SensorId::BatimentosCardiacos,
        SensorId::Saturacao,
        SensorId::TemperaturaCorporal,
        SensorId::TemperaturaAmbiente,
        SensorId::TemperaturaOximetro,
        SensorId::QualidadeArPm25,
        SensorId::QualidadeArPm10,
        SensorId::QualidadeArAqi,
        SensorId::QualidadeArO3,
        SensorId::QualidadeArNo2,
        SensorId::QualidadeArSo2,
        SensorId::Piezo,
        SensorId::ContagemTosse,
        SensorId::Som,
        SensorId::Umidade,
        SensorId::AcelerometroX,
        SensorId::AcelerometroY,
        SensorId::AcelerometroZ,
        SensorId::GiroscopioX,
        SensorId::GiroscopioY,
        SensorId::GiroscopioZ,
    ];

    /// wire name used in topics and persisted keys
    pub fn as_str(self) -> &'static str {
        match self {
            SensorId::FrequenciaRespiratoria => "frequencia-respiratoria",
            SensorId::BatimentosCardiacos => "batimentos-cardiacos",
            SensorId::Saturacao => "saturacao",
            SensorId::TemperaturaCorporal => "temperatura-corporal",
            SensorId::TemperaturaAmbiente => "temperatura-ambiente",
            SensorId::TemperaturaOximetro => "temperatura-oximetro",
            SensorId::QualidadeArPm25 => "qualidade-ar-pm25",
            SensorId::QualidadeArPm10 => "qualidade-ar-pm10",
            SensorId::QualidadeArAqi => "qualidade-ar-aqi",
            SensorId::QualidadeArO3 => "qualidade-ar-o3",
            SensorId::QualidadeArNo2 => "qualidade-ar-no2",
            SensorId::QualidadeArSo2 => "qualidade-ar-so2",
            SensorId::Piezo => "piezo",
            SensorId::ContagemTosse => "contagem-tosse",
            SensorId::Som => "som",
            SensorId::Umidade => "umidade",
            SensorId::AcelerometroX => "acelerometro-x",
            SensorId::AcelerometroY => "acelerometro-y",
            SensorId::AcelerometroZ => "acelerometro-z",
            SensorId::GiroscopioX => "giroscopio-x",
            SensorId::GiroscopioY => "giroscopio-y",
            SensorId::GiroscopioZ => "giroscopio-z",
        }
    }

    pub fn meta(self) -> SensorMeta {
        let (label, unit) = match self {
            SensorId::FrequenciaRespiratoria => ("Frequência Respiratória", "rpm"),
            SensorId::BatimentosCardiacos => ("Batimentos Cardíacos", "bpm"),
            SensorId::Saturacao => ("Saturação de Oxigênio (SpO₂)", "%"),
            SensorId::TemperaturaCorporal => ("Temperatura Corporal", "°C"),
            SensorId::TemperaturaAmbiente => ("Temperatura Ambiente", "°C"),
            SensorId::TemperaturaOximetro => ("Temperatura Oxímetro", "°C"),
            SensorId::QualidadeArPm25 => ("Qualidade do Ar (PM2.5)", "µg/m³"),
            SensorId::QualidadeArPm10 => ("Qualidade do Ar (PM10)", "µg/m³"),
            SensorId::QualidadeArAqi => ("Índice de Qualidade do Ar (AQI)", ""),
            SensorId::QualidadeArO3 => ("Ozônio (O₃)", "µg/m³"),
            SensorId::QualidadeArNo2 => ("Dióxido de Nitrogênio (NO₂)", "µg/m³"),
            SensorId::QualidadeArSo2 => ("Dióxido de Enxofre (SO₂)", "µg/m³"),
            SensorId::Piezo => ("Movimento Torácico (Piezo)", "Hz"),
            SensorId::ContagemTosse => ("Contagem Tosse", "no dia"),
            SensorId::Som => ("Som", "no dia"),
            SensorId::Umidade => ("Umidade do Ar", "%"),
            SensorId::AcelerometroX => ("Acelerômetro X", ""),
            SensorId::AcelerometroY => ("Acelerômetro Y", ""),
            SensorId::AcelerometroZ => ("Acelerômetro Z", ""),
            SensorId::GiroscopioX => ("Giroscópio X", ""),
            SensorId::GiroscopioY => ("Giroscópio Y", ""),
            SensorId::GiroscopioZ => ("Giroscópio Z", ""),
        };
        SensorMeta { label, unit }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSensor(pub String);

impl fmt::Display for UnknownSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown sensor identifier: {}", self.0)
    }
}

impl std::error::Error for UnknownSensor {}

impl FromStr for SensorId {
    type Err = UnknownSensor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownSensor(s.to_string()))
    }
}

// ==============================================================================
// values and readings
// ==============================================================================

/// a decoded payload: sensors publish either numbers or free text
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Numeric(f64),
    Text(String),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // whole numbers print without a trailing ".0" (78, not 78.0)
            SensorValue::Numeric(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            SensorValue::Numeric(n) => write!(f, "{}", n),
            SensorValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for SensorValue {
    fn from(n: f64) -> Self {
        SensorValue::Numeric(n)
    }
}

impl From<&str> for SensorValue {
    fn from(s: &str) -> Self {
        SensorValue::Text(s.to_string())
    }
}

/// last value accepted into the latest view for one sensor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub value: SensorValue,
    /// epoch milliseconds
    #[serde(rename = "updatedAt")]
    pub updated_at: u64,
}

/// one raw arrival, zero-like values included
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// epoch milliseconds
    pub ts: u64,
    pub value: SensorValue,
}

pub type LatestMap = BTreeMap<SensorId, SensorReading>;
pub type HistoryMap = BTreeMap<SensorId, VecDeque<HistoryEntry>>;
pub type AiSnapshot = BTreeMap<SensorId, SensorValue>;

/// current unix time in milliseconds
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for id in SensorId::ALL {
            assert_eq!(id.as_str().parse::<SensorId>(), Ok(id));
        }
    }

    #[test]
    fn serde_names_match_wire_names() {
        for id in SensorId::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.as_str()));
        }
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        assert!("pressao-arterial".parse::<SensorId>().is_err());
        assert!("".parse::<SensorId>().is_err());
    }

    #[test]
    fn metadata_units() {
        assert_eq!(SensorId::BatimentosCardiacos.meta().unit, "bpm");
        assert_eq!(SensorId::QualidadeArAqi.meta().unit, "");
    }

    #[test]
    fn value_display() {
        assert_eq!(SensorValue::Numeric(78.0).to_string(), "78");
        assert_eq!(SensorValue::Numeric(36.6).to_string(), "36.6");
        assert_eq!(SensorValue::from("ok").to_string(), "ok");
    }

    #[test]
    fn reading_uses_camel_case_timestamp() {
        let r = SensorReading { value: SensorValue::Numeric(97.0), updated_at: 5 };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json, serde_json::json!({"value": 97.0, "updatedAt": 5}));
    }
}
