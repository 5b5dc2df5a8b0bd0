/**
 * HEARTH PLUGINS/SECURITY - Surveillance des ouvrants et alarme
 *
 * RÔLE : Reçoit les trames d'état des zones (un caractère 0/1 par zone,
 * 0 = ouvert), tient l'état et l'heure du dernier changement, et nourrit la
 * machine d'alarme : une zone qui s'ouvre pendant que c'est armé déclenche.
 * La promotion en alarme et ses notifications passent par le notifieur.
 *
 * FONCTIONNEMENT : Les trames sont dépouillées au fil de l'eau ; la passe
 * périodique (période de collecte) fait le reste : acquittement automatique
 * si une personne autorisée est à la maison, contrôle de promotion,
 * notification, et une ligne de journal des zones ouvertes pour la
 * timeline.
 */

use crate::alarm::{AlarmMachine, CheckOutcome, SecurityState, DEFAULT_PROMOTION_DELAY};
use crate::config::Config;
use crate::context::Context;
use crate::datalog::presence::PresenceLog;
use crate::lifecycle::{PluginTask, Worker, WorkerCtl};
use crate::net::{self, UdpChannel};
use crate::notify::Notifier;
use crate::plugins::presence::PresenceFeed;
use crate::plugins::{required_param, Plugin};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

struct ZoneState {
    name: String,
    open: bool,
    changed_at: Option<DateTime<Local>>,
}

struct WatchTask {
    channel: UdpChannel,
    zones: Mutex<Vec<ZoneState>>,
    machine: Arc<Mutex<AlarmMachine>>,
    log: PresenceLog,
    presence: Arc<PresenceFeed>,
    notifier: Arc<dyn Notifier>,
    collect_period: Duration,
    last_pass: Mutex<Instant>,
}

impl WatchTask {
    fn apply_frame(&self, frame: &str) {
        let frame = frame.trim();
        let mut zones = self.zones.lock();
        if frame.len() != zones.len() {
            warn!(frame, expected = zones.len(), "trame de zones rejetée");
            return;
        }
        if frame.chars().any(|c| c != '0' && c != '1') {
            warn!(frame, "trame de zones illisible");
            return;
        }

        let mut machine = self.machine.lock();
        for (zone, state) in zones.iter_mut().zip(frame.chars()) {
            let open = state == '0';
            if open == zone.open {
                continue;
            }
            zone.open = open;
            zone.changed_at = Some(Local::now());
            info!(zone = %zone.name, open, "changement d'ouvrant");
            if open {
                machine.trigger(&zone.name);
            }
        }
    }

    fn open_zones(&self) -> Vec<String> {
        self.zones
            .lock()
            .iter()
            .filter(|z| z.open)
            .map(|z| z.name.clone())
            .collect()
    }

    /// Acquittement, contrôle de promotion, notifications, ligne de journal.
    fn periodic_pass(&self) {
        let mut machine = self.machine.lock();
        if self.presence.someone_home() && machine.clear() {
            info!("alarme acquittée, personne autorisée présente");
        }
        match machine.check() {
            CheckOutcome::Idle => {}
            CheckOutcome::Promoted { zones } => {
                error!(?zones, "ALARME déclenchée");
                self.notifier
                    .notify(&format!("ALARM: zones open: {}", zones.join(", ")));
            }
            CheckOutcome::StillAlarm { zones } => {
                self.notifier
                    .notify(&format!("Alarm still active: {}", zones.join(", ")));
            }
        }
        drop(machine);

        self.log.record(&self.open_zones());
    }
}

impl PluginTask for WatchTask {
    fn run_iteration(&self, _ctl: &WorkerCtl) -> anyhow::Result<()> {
        if let Some(frame) = self.channel.recv() {
            self.apply_frame(&frame);
        }

        let mut last_pass = self.last_pass.lock();
        if last_pass.elapsed() >= self.collect_period {
            *last_pass = Instant::now();
            drop(last_pass);
            self.periodic_pass();
        }
        Ok(())
    }
}

pub struct SecurityPlugin {
    worker: Worker,
    enabled: bool,
    machine: Option<Arc<Mutex<AlarmMachine>>>,
    task: Option<Arc<WatchTask>>,
}

impl SecurityPlugin {
    fn bare(worker: Worker, enabled: bool) -> Arc<dyn Plugin> {
        Arc::new(Self {
            worker,
            enabled,
            machine: None,
            task: None,
        })
    }
}

fn parse_zones(cfg: &Config) -> Option<Vec<ZoneState>> {
    required_param(cfg, "security", "zone_0")?;
    let mut zones = Vec::new();
    let mut n = 0;
    while let Some(name) = cfg.get("security", &format!("zone_{n}")) {
        zones.push(ZoneState {
            name: name.trim().to_string(),
            open: false,
            changed_at: None,
        });
        n += 1;
    }
    Some(zones)
}

pub fn factory(ctx: Arc<Context>, cfg: &Config) -> Arc<dyn Plugin> {
    let worker = Worker::new("security");
    let enabled = cfg.enabled("security");
    if !enabled {
        return SecurityPlugin::bare(worker, enabled);
    }

    let Some(presence) = ctx.presence() else {
        warn!("flux de présence absent, surveillance non initialisée");
        return SecurityPlugin::bare(worker, enabled);
    };
    let Some(zones) = parse_zones(cfg) else {
        return SecurityPlugin::bare(worker, enabled);
    };

    let port = cfg.get_u64_or("security", "zone_port", net::ZONE_PORT as u64) as u16;
    let channel = match UdpChannel::bind(ctx.multicast_group(), port, Duration::from_secs(1)) {
        Ok(channel) => channel,
        Err(e) => {
            warn!(port, "port des ouvrants indisponible: {e}");
            return SecurityPlugin::bare(worker, enabled);
        }
    };

    let zone_names: Vec<String> = zones.iter().map(|z| z.name.clone()).collect();
    let log = match PresenceLog::open(ctx.data_dir().join("security"), "security", zone_names) {
        Ok(log) => log,
        Err(e) => {
            warn!("journal de surveillance indisponible: {e}");
            return SecurityPlugin::bare(worker, enabled);
        }
    };

    let promotion_delay = Duration::from_secs(cfg.get_u64_or(
        "security",
        "promotion_delay",
        DEFAULT_PROMOTION_DELAY.as_secs(),
    ));
    let collect_period =
        Duration::from_secs(cfg.get_u64_or("security", "collect_period", 30));
    let machine = Arc::new(Mutex::new(AlarmMachine::new(promotion_delay)));

    let command_machine = machine.clone();
    ctx.router().register("alarm", move |msg| {
        let mut fields = msg.split(',');
        let _topic = fields.next();
        match fields.next().map(str::trim) {
            Some("arm") => {
                if command_machine.lock().arm() {
                    info!("alarme armée");
                } else {
                    warn!("armement refusé dans l'état courant");
                }
            }
            Some("disarm") => {
                command_machine.lock().disarm();
                info!("alarme désarmée");
            }
            other => warn!(?other, "sous-commande alarm inconnue"),
        }
    });

    info!(zones = zones.len(), port, "unité surveillance prête");
    worker.mark_initialized();

    let last_pass = Instant::now()
        .checked_sub(collect_period)
        .unwrap_or_else(Instant::now);
    Arc::new(SecurityPlugin {
        worker,
        enabled,
        machine: Some(machine.clone()),
        task: Some(Arc::new(WatchTask {
            channel,
            zones: Mutex::new(zones),
            machine,
            log,
            presence,
            notifier: ctx.notifier().clone(),
            collect_period,
            last_pass: Mutex::new(last_pass),
        })),
    })
}

impl Plugin for SecurityPlugin {
    fn name(&self) -> &'static str {
        "security"
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
        let (Some(task), Some(machine)) = (&self.task, &self.machine) else {
            return String::new();
        };
        let state = machine.lock().state();
        let mut rows = String::new();
        for zone in task.zones.lock().iter() {
            let door = if zone.open { "open" } else { "closed" };
            let changed = zone
                .changed_at
                .map(|at| at.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "--".to_string());
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{door}</td><td>{changed}</td></tr>\n",
                zone.name
            ));
        }
        format!(
            "<h2>Security: {state}</h2>\n\
             <table class=\"status\"><tr><th>Zone</th><th>State</th><th>Changed</th></tr>\n\
             {rows}</table>\n\
             <div id=\"security_chart_div\"></div>\n"
        )
    }

    fn render_javascript(&self) -> String {
        let Some(task) = &self.task else {
            return String::new();
        };
        task.log
            .timeline_javascript("security", "Zone", "security_chart_div")
    }
}
