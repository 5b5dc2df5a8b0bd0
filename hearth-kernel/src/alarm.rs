/**
 * HEARTH ALARM - Machine à états de l'alarme périmétrique
 *
 * RÔLE : Logique pure Disarmed/Armed/Triggered/Alarm, sans horloge ni
 * notification embarquée. L'appelant injecte les instants et traduit les
 * issues de check() en notifications, ce qui rend la machine testable
 * sans attente réelle.
 */

use std::fmt;
use std::time::{Duration, Instant};

pub const DEFAULT_PROMOTION_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityState {
    Disarmed,
    Armed,
    Triggered,
    Alarm,
}

impl fmt::Display for SecurityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SecurityState::Disarmed => "Disarmed",
            SecurityState::Armed => "Armed",
            SecurityState::Triggered => "Triggered",
            SecurityState::Alarm => "ALARM",
        };
        f.write_str(label)
    }
}

/// Issue d'un passage périodique de check().
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Idle,
    /// Triggered vient de passer Alarm, à notifier une seule fois.
    Promoted { zones: Vec<String> },
    /// Toujours en Alarm, rappel de moindre urgence à chaque passage.
    StillAlarm { zones: Vec<String> },
}

pub struct AlarmMachine {
    state: SecurityState,
    promotion_delay: Duration,
    triggered_at: Option<Instant>,
    zones: Vec<String>,
}

impl AlarmMachine {
    pub fn new(promotion_delay: Duration) -> Self {
        Self {
            state: SecurityState::Disarmed,
            promotion_delay,
            triggered_at: None,
            zones: Vec::new(),
        }
    }

    pub fn state(&self) -> SecurityState {
        self.state
    }

    pub fn triggered_zones(&self) -> &[String] {
        &self.zones
    }

    /// Disarmed vers Armed, refusé partout ailleurs.
    pub fn arm(&mut self) -> bool {
        if self.state == SecurityState::Disarmed {
            self.state = SecurityState::Armed;
            true
        } else {
            false
        }
    }

    /// Retour à Disarmed depuis n'importe quel état, mémoire des zones
    /// effacée.
    pub fn disarm(&mut self) {
        self.state = SecurityState::Disarmed;
        self.triggered_at = None;
        self.zones.clear();
    }

    /// Triggered ou Alarm vers Armed, pour l'effacement automatique quand
    /// la condition de violation a disparu. Jamais depuis Disarmed ou Armed.
    pub fn clear(&mut self) -> bool {
        match self.state {
            SecurityState::Triggered | SecurityState::Alarm => {
                self.state = SecurityState::Armed;
                self.triggered_at = None;
                self.zones.clear();
                true
            }
            _ => false,
        }
    }

    pub fn trigger(&mut self, zone: &str) {
        self.trigger_at(zone, Instant::now());
    }

    fn trigger_at(&mut self, zone: &str, now: Instant) {
        match self.state {
            SecurityState::Disarmed => {}
            SecurityState::Armed => {
                self.state = SecurityState::Triggered;
                self.triggered_at = Some(now);
                self.remember_zone(zone);
            }
            SecurityState::Triggered | SecurityState::Alarm => {
                self.remember_zone(zone);
            }
        }
    }

    pub fn check(&mut self) -> CheckOutcome {
        self.check_at(Instant::now())
    }

    fn check_at(&mut self, now: Instant) -> CheckOutcome {
        match self.state {
            SecurityState::Triggered => {
                let overdue = self
                    .triggered_at
                    .is_some_and(|t| now.duration_since(t) > self.promotion_delay);
                if overdue {
                    self.state = SecurityState::Alarm;
                    CheckOutcome::Promoted {
                        zones: self.zones.clone(),
                    }
                } else {
                    CheckOutcome::Idle
                }
            }
            SecurityState::Alarm => CheckOutcome::StillAlarm {
                zones: self.zones.clone(),
            },
            _ => CheckOutcome::Idle,
        }
    }

    fn remember_zone(&mut self, zone: &str) {
        if !self.zones.iter().any(|z| z == zone) {
            self.zones.push(zone.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> AlarmMachine {
        AlarmMachine::new(Duration::from_secs(30))
    }

    #[test]
    fn arm_only_from_disarmed() {
        let mut m = machine();
        assert!(m.arm());
        assert_eq!(m.state(), SecurityState::Armed);
        assert!(!m.arm());
    }

    #[test]
    fn trigger_ignored_while_disarmed() {
        let mut m = machine();
        m.trigger("front_door");
        assert_eq!(m.state(), SecurityState::Disarmed);
        assert!(m.triggered_zones().is_empty());
    }

    #[test]
    fn promotion_fires_once_then_repeats_lower_urgency() {
        let mut m = machine();
        m.arm();
        let t0 = Instant::now();
        m.trigger_at("front_door", t0);
        assert_eq!(m.state(), SecurityState::Triggered);

        // encore dans le délai
        assert_eq!(m.check_at(t0 + Duration::from_secs(29)), CheckOutcome::Idle);
        assert_eq!(m.state(), SecurityState::Triggered);

        let late = t0 + Duration::from_secs(31);
        assert_eq!(
            m.check_at(late),
            CheckOutcome::Promoted {
                zones: vec!["front_door".to_string()]
            }
        );
        assert_eq!(m.state(), SecurityState::Alarm);

        assert_eq!(
            m.check_at(late + Duration::from_secs(5)),
            CheckOutcome::StillAlarm {
                zones: vec!["front_door".to_string()]
            }
        );
        assert_eq!(
            m.check_at(late + Duration::from_secs(10)),
            CheckOutcome::StillAlarm {
                zones: vec!["front_door".to_string()]
            }
        );
    }

    #[test]
    fn zones_accumulate_without_duplicates() {
        let mut m = machine();
        m.arm();
        let t0 = Instant::now();
        m.trigger_at("front_door", t0);
        m.trigger_at("garage", t0 + Duration::from_secs(1));
        m.trigger_at("front_door", t0 + Duration::from_secs(2));
        assert_eq!(m.triggered_zones(), ["front_door", "garage"]);
    }

    #[test]
    fn disarm_resets_everything_from_alarm() {
        let mut m = machine();
        m.arm();
        let t0 = Instant::now();
        m.trigger_at("front_door", t0);
        m.check_at(t0 + Duration::from_secs(31));
        assert_eq!(m.state(), SecurityState::Alarm);

        m.disarm();
        assert_eq!(m.state(), SecurityState::Disarmed);
        assert!(m.triggered_zones().is_empty());
    }

    #[test]
    fn clear_downgrades_only_triggered_or_alarm() {
        let mut m = machine();
        assert!(!m.clear());
        m.arm();
        assert!(!m.clear());
        assert_eq!(m.state(), SecurityState::Armed);

        let t0 = Instant::now();
        m.trigger_at("garage", t0);
        assert!(m.clear());
        assert_eq!(m.state(), SecurityState::Armed);
        assert!(m.triggered_zones().is_empty());
    }
}
