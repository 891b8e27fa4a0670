//! Renders the ai snapshot as the plain-text block prepended to user turns.

use crate::domain::{AiSnapshot, SensorId};

/// sensors worth mentioning to the assistant, in the order they are listed
const CONTEXT_SENSORS: [SensorId; 10] = [
    SensorId::BatimentosCardiacos,
    SensorId::Saturacao,
    SensorId::TemperaturaAmbiente,
    SensorId::Umidade,
    SensorId::QualidadeArAqi,
    SensorId::QualidadeArO3,
    SensorId::QualidadeArNo2,
    SensorId::QualidadeArSo2,
    SensorId::QualidadeArPm25,
    SensorId::QualidadeArPm10,
];

const HEADER: &str = "Leituras mais recentes:";
const ZERO_NOTE: &str = "(Obs.: caso algum valor pareça \"0\", pode indicar falta de dedo no oxímetro ou sensor sem leitura no momento.)";

/// empty string when none of the listed sensors has a value
pub fn build_sensors_context(snapshot: &AiSnapshot) -> String {
    let lines: Vec<String> = CONTEXT_SENSORS
        .iter()
        .filter_map(|id| {
            let value = snapshot.get(id)?;
            let meta = id.meta();
            let unit = if meta.unit.is_empty() {
                String::new()
            } else {
                format!(" {}", meta.unit)
            };
            Some(format!("- {}: {}{}", meta.label, value, unit))
        })
        .collect();

    if lines.is_empty() {
        return String::new();
    }
    format!("{}\n{}\n{}", HEADER, lines.join("\n"), ZERO_NOTE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SensorValue;

    #[test]
    fn empty_snapshot_renders_nothing() {
        assert_eq!(build_sensors_context(&AiSnapshot::new()), "");
    }

    #[test]
    fn sensors_outside_the_list_are_ignored() {
        let mut snapshot = AiSnapshot::new();
        snapshot.insert(SensorId::GiroscopioX, SensorValue::Numeric(1.2));
        assert_eq!(build_sensors_context(&snapshot), "");
    }

    #[test]
    fn lines_follow_list_order_with_units() {
        let mut snapshot = AiSnapshot::new();
        snapshot.insert(SensorId::QualidadeArAqi, SensorValue::Numeric(42.0));
        snapshot.insert(SensorId::BatimentosCardiacos, SensorValue::Numeric(78.0));

        let ctx = build_sensors_context(&snapshot);
        let lines: Vec<&str> = ctx.lines().collect();
        assert_eq!(lines[0], "Leituras mais recentes:");
        assert_eq!(lines[1], "- Batimentos Cardíacos: 78 bpm");
        assert_eq!(lines[2], "- Índice de Qualidade do Ar (AQI): 42");
        assert!(lines[3].starts_with("(Obs.:"));
    }
}
