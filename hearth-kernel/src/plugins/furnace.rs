/**
 * HEARTH PLUGINS/FURNACE - Pilotage du chauffage par zone
 *
 * RÔLE : Compare à chaque période la température courante de chaque zone à
 * sa consigne effective et commande le relais correspondant. Bande
 * d'hystérésis de 1 °F au-dessus de la consigne : la commande précédente
 * tient dans la bande, le relais ne claque pas à chaque dixième de degré.
 *
 * Température invalide (zone muette, relevé périmé) : zone coupée. À
 * l'arrêt de l'unité, tous les relais sont forcés à off.
 */

use crate::config::Config;
use crate::context::Context;
use crate::datalog::presence::PresenceLog;
use crate::lifecycle::{PluginTask, Worker, WorkerCtl};
use crate::notify::{spawn_detached, substituted_argv};
use crate::plugins::setpoint::SetPointFeed;
use crate::plugins::temperature::TemperatureFeed;
use crate::plugins::Plugin;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const HYSTERESIS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeatCommand {
    Heat,
    Off,
}

fn decide(current: Option<f64>, set_point: f64, previous: HeatCommand) -> HeatCommand {
    match current {
        None => HeatCommand::Off,
        Some(t) if t < set_point => HeatCommand::Heat,
        Some(t) if t > set_point + HYSTERESIS => HeatCommand::Off,
        Some(_) => previous,
    }
}

/// Relais réels via commande externe, ou journal seul sans configuration.
struct RelayDriver {
    template: Option<String>,
}

impl RelayDriver {
    fn drive(&self, zone: &str, command: HeatCommand) {
        let state = match command {
            HeatCommand::Heat => "on",
            HeatCommand::Off => "off",
        };
        match &self.template {
            Some(template) => {
                match substituted_argv(template, &[("{zone}", zone), ("{state}", state)]) {
                    Ok(argv) => spawn_detached(&argv),
                    Err(e) => warn!("gabarit de relais invalide: {e}"),
                }
            }
            None => info!(zone, state, "relais non configuré"),
        }
    }
}

struct ControlTask {
    temperatures: Arc<TemperatureFeed>,
    set_points: Arc<SetPointFeed>,
    relays: RelayDriver,
    log: PresenceLog,
    period: u64,
    commands: Mutex<HashMap<String, HeatCommand>>,
}

impl ControlTask {
    fn control_pass(&self) -> Vec<String> {
        let mut heating = Vec::new();
        for zone in self.temperatures.zone_names() {
            let current = self.temperatures.current(&zone);
            let set_point = self.set_points.effective(&zone);
            let previous = self
                .commands
                .lock()
                .get(&zone)
                .copied()
                .unwrap_or(HeatCommand::Off);

            let next = decide(current, set_point, previous);
            if next != previous {
                info!(%zone, ?current, set_point, ?next, "commande de zone");
            }
            // ré-asserté à chaque passage, un relais redémarré se recale seul
            self.relays.drive(&zone, next);
            self.commands.lock().insert(zone.clone(), next);
            if next == HeatCommand::Heat {
                heating.push(zone);
            }
        }
        heating
    }
}

impl PluginTask for ControlTask {
    fn run_iteration(&self, ctl: &WorkerCtl) -> anyhow::Result<()> {
        let heating = self.control_pass();
        self.log.record(&heating);
        ctl.pause(self.period);
        Ok(())
    }

    fn cleanup(&self) {
        for zone in self.temperatures.zone_names() {
            self.relays.drive(&zone, HeatCommand::Off);
        }
        self.commands.lock().clear();
    }
}

pub struct FurnacePlugin {
    worker: Worker,
    enabled: bool,
    task: Option<Arc<ControlTask>>,
}

impl FurnacePlugin {
    fn bare(worker: Worker, enabled: bool) -> Arc<dyn Plugin> {
        Arc::new(Self {
            worker,
            enabled,
            task: None,
        })
    }
}

pub fn factory(ctx: Arc<Context>, cfg: &Config) -> Arc<dyn Plugin> {
    let worker = Worker::new("furnace");
    let enabled = cfg.enabled("furnace");
    if !enabled {
        return FurnacePlugin::bare(worker, enabled);
    }

    let Some(temperatures) = ctx.temperatures() else {
        warn!("flux de températures absent, chauffage non initialisé");
        return FurnacePlugin::bare(worker, enabled);
    };
    let Some(set_points) = ctx.set_points() else {
        warn!("flux de consignes absent, chauffage non initialisé");
        return FurnacePlugin::bare(worker, enabled);
    };

    let period = cfg.get_u64_or("furnace", "period", 60);
    let relays = RelayDriver {
        template: cfg.get("furnace", "relay_command").map(str::to_string),
    };
    let log = match PresenceLog::open(
        ctx.data_dir().join("furnace"),
        "furnace",
        temperatures.zone_names(),
    ) {
        Ok(log) => log,
        Err(e) => {
            warn!("journal du chauffage indisponible: {e}");
            return FurnacePlugin::bare(worker, enabled);
        }
    };

    info!(period, "unité chauffage prête");
    worker.mark_initialized();
    Arc::new(FurnacePlugin {
        worker,
        enabled,
        task: Some(Arc::new(ControlTask {
            temperatures,
            set_points,
            relays,
            log,
            period,
            commands: Mutex::new(HashMap::new()),
        })),
    })
}

impl Plugin for FurnacePlugin {
    fn name(&self) -> &'static str {
        "furnace"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_initialized(&self) -> bool {
        self.worker.is_initialized()
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(self: Arc<Self>) {
        if let Some(task) = &self.task {
            self.worker.start(task.clone());
        }
    }

    fn stop(&self) {
        self.worker.stop();
    }

    fn render_html(&self) -> String {
        let Some(task) = &self.task else {
            return String::new();
        };
        let commands = task.commands.lock();
        let mut rows = String::new();
        for zone in task.temperatures.zone_names() {
            let state = match commands.get(&zone) {
                Some(HeatCommand::Heat) => "heating",
                _ => "off",
            };
            rows.push_str(&format!("<tr><td>{zone}</td><td>{state}</td></tr>\n"));
        }
        format!(
            "<h2>Furnace</h2>\n\
             <table class=\"status\"><tr><th>Zone</th><th>State</th></tr>\n{rows}</table>\n\
             <div id=\"furnace_chart_div\"></div>\n"
        )
    }

    fn render_javascript(&self) -> String {
        let Some(task) = &self.task else {
            return String::new();
        };
        task.log
            .timeline_javascript("furnace", "Zone", "furnace_chart_div")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::presence::PresenceFeed;
    use crate::plugins::setpoint::UserRule;
    use std::time::Duration;

    #[test]
    fn decision_covers_the_hysteresis_band() {
        use HeatCommand::*;
        // zone muette : toujours coupée
        assert_eq!(decide(None, 65.0, Heat), Off);
        assert_eq!(decide(None, 65.0, Off), Off);
        // sous la consigne : chauffe
        assert_eq!(decide(Some(64.9), 65.0, Off), Heat);
        // dans la bande [consigne, consigne+1] : on tient la commande
        assert_eq!(decide(Some(65.0), 65.0, Heat), Heat);
        assert_eq!(decide(Some(65.0), 65.0, Off), Off);
        assert_eq!(decide(Some(66.0), 65.0, Heat), Heat);
        // au-dessus de la bande : coupe
        assert_eq!(decide(Some(66.1), 65.0, Heat), Off);
    }

    fn tracked_feeds(tmp: &std::path::Path) -> (Arc<TemperatureFeed>, Arc<SetPointFeed>) {
        let temperatures = Arc::new(TemperatureFeed::for_tests(
            &[("dev_a", "Living Room"), ("dev_b", "Bedroom")],
            Duration::from_secs(600),
        ));
        let presence = Arc::new(PresenceFeed::for_tests(
            &[("alice", "aa:aa")],
            Duration::from_secs(600),
        ));
        presence.mark_seen("alice");
        let set_points = Arc::new(SetPointFeed::load(
            tmp.join("set_points.yaml"),
            60.0,
            vec!["Living Room".into(), "Bedroom".into()],
            vec![UserRule {
                user: "alice".into(),
                zones: vec!["Living Room".into(), "Bedroom".into()],
            }],
            presence,
        ));
        (temperatures, set_points)
    }

    #[test]
    fn cold_zones_heat_and_land_in_the_timeline_log() {
        let tmp = tempfile::tempdir().unwrap();
        let (temperatures, set_points) = tracked_feeds(tmp.path());
        temperatures.apply_frame("dev_a:65.0");
        temperatures.apply_frame("dev_b:80.0");
        set_points.set("Living Room", "70.0");
        set_points.set("Bedroom", "70.0");

        let task = ControlTask {
            temperatures,
            set_points,
            relays: RelayDriver { template: None },
            log: PresenceLog::open(
                tmp.path().join("furnace"),
                "furnace",
                vec!["Living Room".into(), "Bedroom".into()],
            )
            .unwrap(),
            period: 0,
            commands: Mutex::new(HashMap::new()),
        };

        task.run_iteration(&WorkerCtl::for_tests("furnace")).unwrap();
        {
            let commands = task.commands.lock();
            assert_eq!(commands.get("Living Room"), Some(&HeatCommand::Heat));
            assert_eq!(commands.get("Bedroom"), Some(&HeatCommand::Off));
        }

        let today = std::fs::read_to_string(tmp.path().join("furnace/today.csv")).unwrap();
        assert!(today.lines().last().unwrap().ends_with(",Living Room"));

        task.cleanup();
        assert!(task.commands.lock().is_empty());
    }

    #[test]
    fn silent_sensor_shuts_its_zone_down() {
        let tmp = tempfile::tempdir().unwrap();
        // fraîcheur nulle : le relevé est périmé sitôt reçu
        let temperatures = Arc::new(TemperatureFeed::for_tests(
            &[("dev_a", "Living Room")],
            Duration::ZERO,
        ));
        temperatures.apply_frame("dev_a:55.0");
        let presence = Arc::new(PresenceFeed::for_tests(
            &[("alice", "aa:aa")],
            Duration::from_secs(600),
        ));
        presence.mark_seen("alice");
        let set_points = Arc::new(SetPointFeed::load(
            tmp.path().join("set_points.yaml"),
            60.0,
            vec!["Living Room".into()],
            vec![UserRule {
                user: "alice".into(),
                zones: vec!["Living Room".into()],
            }],
            presence,
        ));
        set_points.set("Living Room", "70.0");

        let task = ControlTask {
            temperatures,
            set_points,
            relays: RelayDriver { template: None },
            log: PresenceLog::open(
                tmp.path().join("furnace"),
                "furnace",
                vec!["Living Room".into()],
            )
            .unwrap(),
            period: 0,
            commands: Mutex::new(HashMap::from([(
                "Living Room".to_string(),
                HeatCommand::Heat,
            )])),
        };
        task.run_iteration(&WorkerCtl::for_tests("furnace")).unwrap();
        assert_eq!(
            task.commands.lock().get("Living Room"),
            Some(&HeatCommand::Off)
        );
    }
}
