/*!
Simulateur de compteur d'énergie.

Produit des lignes JSON au format du collecteur radio, une lecture par
ligne, pour nourrir le contrôleur via un faux `collector_command` (un
simple `cat` d'un fichier généré, ou un binaire qui boucle sur
[`MeterSimulator::next_line`]).
*/

use anyhow::Result;
use chrono::Local;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MeterMessage {
    #[serde(rename = "ERTSerialNumber")]
    pub ert_serial_number: u64,
    #[serde(rename = "LastConsumptionCount")]
    pub last_consumption_count: u64,
}

/// Une lecture telle que le collecteur la sort : horodatage et message du
/// compteur. Le compte de consommation est en centièmes de kWh.
#[derive(Debug, Serialize)]
pub struct MeterReading {
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Message")]
    pub message: MeterMessage,
}

impl MeterReading {
    pub fn new(serial: u64, consumption_count: u64) -> Self {
        Self {
            time: Local::now().to_rfc3339(),
            message: MeterMessage {
                ert_serial_number: serial,
                last_consumption_count: consumption_count,
            },
        }
    }

    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Compteur qui avance d'un pas fixe à chaque lecture.
pub struct MeterSimulator {
    serial: u64,
    count: u64,
    step: u64,
}

impl MeterSimulator {
    pub fn new(serial: u64, start_count: u64, step: u64) -> Self {
        Self {
            serial,
            count: start_count,
            step,
        }
    }

    pub fn next_line(&mut self) -> Result<String> {
        let line = MeterReading::new(self.serial, self.count).to_line()?;
        self.count += self.step;
        log::debug!("📤 lecture compteur: {line}");
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_serialize_with_collector_field_names() {
        let line = MeterReading::new(12345678, 204250).to_line().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        let message = value.get("Message").unwrap();
        assert_eq!(message.get("ERTSerialNumber").unwrap().as_u64(), Some(12345678));
        assert_eq!(
            message.get("LastConsumptionCount").unwrap().as_u64(),
            Some(204250)
        );
        assert!(value.get("Time").is_some());
    }

    #[test]
    fn simulator_advances_by_its_step() {
        let mut meter = MeterSimulator::new(99, 100, 25);
        let first: serde_json::Value =
            serde_json::from_str(&meter.next_line().unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&meter.next_line().unwrap()).unwrap();
        let count = |v: &serde_json::Value| {
            v.get("Message")
                .unwrap()
                .get("LastConsumptionCount")
                .unwrap()
                .as_u64()
                .unwrap()
        };
        assert_eq!(count(&first), 100);
        assert_eq!(count(&second), 125);
    }
}
