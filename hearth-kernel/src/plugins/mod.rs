/**
 * HEARTH PLUGINS - Contrat d'unité et table d'enregistrement
 *
 * RÔLE : Le trait que chaque unité périodique implémente, le descripteur
 * (nom + prérequis + fabrique) et la liste compile-time des unités
 * embarquées. Le superviseur ne connaît que cette table : ajouter une unité
 * c'est ajouter une ligne, pas toucher au superviseur.
 *
 * FONCTIONNEMENT : Une fabrique reçoit le contexte partagé et la
 * configuration, valide ses clés, et rend une unité soit initialisée soit
 * restée à l'état construit (clé manquante, ressource indisponible). Le
 * superviseur saute les dépendants d'une unité non initialisée au lieu de
 * refuser de servir le reste de la maison.
 */

use crate::config::Config;
use crate::context::Context;
use std::sync::Arc;
use tracing::warn;

pub mod comms;
pub mod energy;
pub mod furnace;
pub mod memory;
pub mod presence;
pub mod security;
pub mod setpoint;
pub mod status;
pub mod temperature;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drapeau de configuration, indépendant de l'état d'initialisation.
    fn is_enabled(&self) -> bool;

    /// Vrai si la construction a validé configuration et ressources.
    fn is_initialized(&self) -> bool;

    fn is_running(&self) -> bool;

    fn start(self: Arc<Self>);

    fn stop(&self);

    /// Fragment HTML de la page d'état, vide par défaut.
    fn render_html(&self) -> String {
        String::new()
    }

    /// Fragment JavaScript associé (graphes), vide par défaut.
    fn render_javascript(&self) -> String {
        String::new()
    }
}

pub type PluginFactory = fn(Arc<Context>, &Config) -> Arc<dyn Plugin>;

#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    pub name: &'static str,
    pub depends_on: &'static [&'static str],
    pub factory: PluginFactory,
}

/// Table d'enregistrement. L'ordre de déclaration est aussi l'ordre de
/// rendu de la page d'état.
pub fn builtin() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor {
            name: "commands",
            depends_on: &[],
            factory: comms::factory,
        },
        PluginDescriptor {
            name: "temperature",
            depends_on: &[],
            factory: temperature::factory,
        },
        PluginDescriptor {
            name: "presence",
            depends_on: &[],
            factory: presence::factory,
        },
        PluginDescriptor {
            name: "memory",
            depends_on: &[],
            factory: memory::factory,
        },
        PluginDescriptor {
            name: "energy",
            depends_on: &[],
            factory: energy::factory,
        },
        PluginDescriptor {
            name: "setpoint",
            depends_on: &["temperature", "presence", "commands"],
            factory: setpoint::factory,
        },
        PluginDescriptor {
            name: "furnace",
            depends_on: &["temperature", "setpoint"],
            factory: furnace::factory,
        },
        PluginDescriptor {
            name: "security",
            depends_on: &["presence", "commands"],
            factory: security::factory,
        },
        PluginDescriptor {
            name: "status",
            depends_on: &[],
            factory: status::factory,
        },
    ]
}

/// Clé obligatoire : absente, on avertit et la fabrique rend une unité non
/// initialisée au lieu d'abattre le processus.
pub(crate) fn required_param(cfg: &Config, section: &str, key: &str) -> Option<String> {
    match cfg.require(section, key) {
        Ok(value) => Some(value.to_string()),
        Err(e) => {
            warn!("{e}");
            None
        }
    }
}

/// Configuration de départ, une section par unité embarquée.
pub fn template_config() -> String {
    r#"# Configuration du contrôleur. Une section par unité ; retirer la
# section ou mettre enabled: false pour désactiver l'unité.

general:
  data_dir: data
  bind_address: 0.0.0.0:8080
  multicast_group: 225.1.1.1
  announce_port: 5100

# Sans commande configurée, les notifications partent dans le journal.
notify:
  command: "signal-cli send -m {message} {number}"
  number: "+15550000000"

commands:
  enabled: true
  command_port: 5200

temperature:
  enabled: true
  sensor_port: 5300
  collect_period: 120
  staleness: 600
  zone_0: "thermostat_a=Living Room"
  zone_1: "thermostat_b=Bedroom"

presence:
  enabled: true
  probe_command: "arp-scan -l"
  collect_period: 30
  away_timeout: 600
  user_0: "alice=aa:bb:cc:dd:ee:ff"
  user_1: "bob=11:22:33:44:55:66"

memory:
  enabled: true
  collect_period: 60

energy:
  enabled: true
  collector_command: "rtlamr -format=json"
  meter_serial: 12345678

setpoint:
  enabled: true
  set_point_file: set_points.yaml
  away_set_point: 60.0
  rule_0: "alice=Living Room,Bedroom"
  rule_1: "bob=Living Room"

furnace:
  enabled: true
  period: 60
  relay_command: "relay-ctl {zone} {state}"

security:
  enabled: true
  zone_port: 5500
  promotion_delay: 30
  zone_0: front_door
  zone_1: back_door
  zone_2: garage

status:
  enabled: true
"#
    .to_string()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Unité factice pilotée par la configuration : `broken: true` dans sa
    /// section simule une initialisation ratée.
    pub struct StubPlugin {
        pub name: &'static str,
        pub enabled: bool,
        pub initialized: bool,
        pub running: AtomicBool,
        pub started: AtomicUsize,
        pub stopped: AtomicUsize,
    }

    impl StubPlugin {
        pub fn configured(name: &'static str, cfg: &Config) -> Self {
            Self {
                name,
                enabled: cfg.enabled(name),
                initialized: cfg.get(name, "broken").is_none(),
                running: AtomicBool::new(false),
                started: AtomicUsize::new(0),
                stopped: AtomicUsize::new(0),
            }
        }
    }

    impl Plugin for StubPlugin {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn is_initialized(&self) -> bool {
            self.initialized
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn start(self: Arc<Self>) {
            if self.enabled && self.initialized && !self.running.swap(true, Ordering::SeqCst) {
                self.started.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn stop(&self) {
            if self.running.swap(false, Ordering::SeqCst) {
                self.stopped.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn render_html(&self) -> String {
            format!("<p>{}</p>", self.name)
        }
    }

    fn stub_factory(_ctx: Arc<Context>, _cfg: &Config) -> Arc<dyn Plugin> {
        Arc::new(StubPlugin::configured("stub", &Config::empty()))
    }

    pub fn descriptor(
        name: &'static str,
        depends_on: &'static [&'static str],
    ) -> PluginDescriptor {
        PluginDescriptor {
            name,
            depends_on,
            factory: stub_factory,
        }
    }

    #[test]
    fn builtin_table_names_are_unique_and_deps_known() {
        let table = builtin();
        for d in &table {
            assert_eq!(table.iter().filter(|o| o.name == d.name).count(), 1);
            for dep in d.depends_on {
                assert!(table.iter().any(|o| &o.name == dep), "unknown dep {dep}");
            }
        }
    }

    #[test]
    fn template_parses_with_every_builtin_section() {
        let cfg = Config::from_str(&template_config()).unwrap();
        for d in builtin() {
            assert!(cfg.has_section(d.name), "missing section {}", d.name);
        }
        assert!(cfg.has_section("general"));
        assert!(cfg.enabled("security"));
    }

    #[test]
    fn required_param_warns_and_returns_none_when_absent() {
        let cfg = Config::empty();
        assert!(required_param(&cfg, "security", "zone_0").is_none());
    }
}
