/**
 * HEARTH PLUGINS/TEMPERATURE - Relevés de température par zone
 *
 * RÔLE : Reçoit les trames `device_id:temp_f` poussées par les thermostats,
 * tient la température courante par zone et publie le flux consommé par la
 * consigne et la chaudière. Une ligne de journal par période de collecte,
 * NaN pour les zones muettes, ce qui troue la courbe au lieu de mentir.
 *
 * Un relevé plus vieux que la fenêtre de fraîcheur ne vaut rien : le flux
 * rend None et la chaudière coupe la zone.
 */

use crate::config::Config;
use crate::context::Context;
use crate::datalog::value::ValueLog;
use crate::lifecycle::{PluginTask, Worker, WorkerCtl};
use crate::net::{self, UdpChannel};
use crate::plugins::{required_param, Plugin};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

struct ZoneSensor {
    device_id: String,
    zone: String,
}

pub struct TemperatureFeed {
    staleness: Duration,
    zones: Vec<ZoneSensor>,
    readings: Mutex<HashMap<String, (f64, Instant)>>,
    unknown_logged: Mutex<HashSet<String>>,
}

impl TemperatureFeed {
    fn new(zones: Vec<ZoneSensor>, staleness: Duration) -> Self {
        Self {
            staleness,
            zones,
            readings: Mutex::new(HashMap::new()),
            unknown_logged: Mutex::new(HashSet::new()),
        }
    }

    pub fn zone_names(&self) -> Vec<String> {
        self.zones.iter().map(|z| z.zone.clone()).collect()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(pairs: &[(&str, &str)], staleness: Duration) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(device_id, zone)| ZoneSensor {
                    device_id: device_id.to_string(),
                    zone: zone.to_string(),
                })
                .collect(),
            staleness,
        )
    }

    /// Température courante d'une zone, None si jamais vue ou périmée.
    pub fn current(&self, zone: &str) -> Option<f64> {
        let sensor = self.zones.iter().find(|z| z.zone == zone)?;
        let readings = self.readings.lock();
        let (value, at) = readings.get(&sensor.device_id)?;
        if at.elapsed() < self.staleness {
            Some(*value)
        } else {
            None
        }
    }

    pub(crate) fn apply_frame(&self, frame: &str) {
        let Some((device_id, raw_temp)) = frame.split_once(':') else {
            warn!(frame, "trame capteur sans séparateur");
            return;
        };
        let Ok(temp) = raw_temp.trim().parse::<f64>() else {
            warn!(frame, "température illisible");
            return;
        };
        if !self.zones.iter().any(|z| z.device_id == device_id) {
            // un seul message par capteur bavard inconnu
            if self.unknown_logged.lock().insert(device_id.to_string()) {
                debug!(device_id, "capteur inconnu ignoré");
            }
            return;
        }
        self.readings
            .lock()
            .insert(device_id.to_string(), (temp, Instant::now()));
    }
}

struct CollectTask {
    feed: Arc<TemperatureFeed>,
    log: ValueLog,
    channel: UdpChannel,
    period: Duration,
    last_row: Mutex<Instant>,
}

impl PluginTask for CollectTask {
    fn run_iteration(&self, _ctl: &WorkerCtl) -> anyhow::Result<()> {
        if let Some(frame) = self.channel.recv() {
            self.feed.apply_frame(&frame);
        }

        let mut last_row = self.last_row.lock();
        if last_row.elapsed() >= self.period {
            let row: Vec<f64> = self
                .feed
                .zones
                .iter()
                .map(|z| self.feed.current(&z.zone).unwrap_or(f64::NAN))
                .collect();
            self.log.record(&row);
            *last_row = Instant::now();
        }
        Ok(())
    }
}

pub struct TemperaturePlugin {
    worker: Worker,
    enabled: bool,
    feed: Option<Arc<TemperatureFeed>>,
    task: Option<Arc<CollectTask>>,
}

impl TemperaturePlugin {
    fn bare(worker: Worker, enabled: bool) -> Arc<dyn Plugin> {
        Arc::new(Self {
            worker,
            enabled,
            feed: None,
            task: None,
        })
    }
}

/// `zone_0..zone_N` en paires `device_id=Nom de zone`, liste arrêtée à la
/// première clé absente.
fn parse_zones(cfg: &Config) -> Option<Vec<ZoneSensor>> {
    required_param(cfg, "temperature", "zone_0")?;
    let mut zones = Vec::new();
    let mut n = 0;
    while let Some(pair) = cfg.get("temperature", &format!("zone_{n}")) {
        let Some((device_id, zone)) = pair.split_once('=') else {
            warn!(pair, "zone attendue en `device_id=nom`");
            return None;
        };
        zones.push(ZoneSensor {
            device_id: device_id.trim().to_string(),
            zone: zone.trim().to_string(),
        });
        n += 1;
    }
    Some(zones)
}

pub fn factory(ctx: Arc<Context>, cfg: &Config) -> Arc<dyn Plugin> {
    let worker = Worker::new("temperature");
    let enabled = cfg.enabled("temperature");
    if !enabled {
        return TemperaturePlugin::bare(worker, enabled);
    }

    let Some(zones) = parse_zones(cfg) else {
        return TemperaturePlugin::bare(worker, enabled);
    };
    let staleness = Duration::from_secs(cfg.get_u64_or("temperature", "staleness", 600));
    let period = Duration::from_secs(cfg.get_u64_or("temperature", "collect_period", 120));
    let port = cfg.get_u64_or("temperature", "sensor_port", net::SENSOR_PORT as u64) as u16;

    let channel = match UdpChannel::bind(ctx.multicast_group(), port, Duration::from_secs(1)) {
        Ok(channel) => channel,
        Err(e) => {
            warn!(port, "port capteurs indisponible: {e}");
            return TemperaturePlugin::bare(worker, enabled);
        }
    };

    let feed = Arc::new(TemperatureFeed::new(zones, staleness));
    let log = match ValueLog::open(
        ctx.data_dir().join("temperature"),
        "temperature",
        feed.zone_names(),
    ) {
        Ok(log) => log,
        Err(e) => {
            warn!("journal de température indisponible: {e}");
            return TemperaturePlugin::bare(worker, enabled);
        }
    };

    info!(zones = feed.zones.len(), port, "unité température prête");
    ctx.publish_temperatures(feed.clone());
    worker.mark_initialized();

    let last_row = Instant::now()
        .checked_sub(period)
        .unwrap_or_else(Instant::now);
    Arc::new(TemperaturePlugin {
        worker,
        enabled,
        feed: Some(feed.clone()),
        task: Some(Arc::new(CollectTask {
            feed,
            log,
            channel,
            period,
            last_row: Mutex::new(last_row),
        })),
    })
}

impl Plugin for TemperaturePlugin {
    fn name(&self) -> &'static str {
        "temperature"
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
        let Some(feed) = &self.feed else {
            return String::new();
        };
        let mut rows = String::new();
        for zone in feed.zone_names() {
            let value = feed
                .current(&zone)
                .map(|t| format!("{t:.1}"))
                .unwrap_or_else(|| "--".to_string());
            rows.push_str(&format!("<tr><td>{zone}</td><td>{value}</td></tr>\n"));
        }
        format!(
            "<h2>Temperatures</h2>\n\
             <table class=\"status\"><tr><th>Zone</th><th>&deg;F</th></tr>\n{rows}</table>\n\
             <div id=\"temperature_chart_div\"></div>\n"
        )
    }

    fn render_javascript(&self) -> String {
        let Some(task) = &self.task else {
            return String::new();
        };
        task.log.linechart_javascript(
            "temperature",
            "Temperatures (F)",
            "temperature_chart_div",
            "/data/temperature",
            "",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(staleness_secs: u64) -> TemperatureFeed {
        TemperatureFeed::new(
            vec![
                ZoneSensor {
                    device_id: "thermostat_a".into(),
                    zone: "Living Room".into(),
                },
                ZoneSensor {
                    device_id: "thermostat_b".into(),
                    zone: "Bedroom".into(),
                },
            ],
            Duration::from_secs(staleness_secs),
        )
    }

    #[test]
    fn frames_update_the_matching_zone_only() {
        let feed = feed(600);
        feed.apply_frame("thermostat_a:70.25");
        assert_eq!(feed.current("Living Room"), Some(70.25));
        assert_eq!(feed.current("Bedroom"), None);
    }

    #[test]
    fn unknown_devices_and_garbage_frames_are_ignored() {
        let feed = feed(600);
        feed.apply_frame("mystery:70.0");
        feed.apply_frame("no separator");
        feed.apply_frame("thermostat_a:warm");
        assert_eq!(feed.current("Living Room"), None);
        assert_eq!(feed.current("Bedroom"), None);
    }

    #[test]
    fn stale_readings_read_as_absent() {
        let feed = feed(0);
        feed.apply_frame("thermostat_a:70.25");
        assert_eq!(feed.current("Living Room"), None);
    }

    #[test]
    fn factory_requires_zone_declarations() {
        let ctx = Arc::new(Context::new(&Config::empty()).unwrap());
        let cfg = Config::from_str("temperature:\n  enabled: true\n").unwrap();
        let plugin = factory(ctx.clone(), &cfg);
        assert!(plugin.is_enabled());
        assert!(!plugin.is_initialized());
        assert!(ctx.temperatures().is_none());
    }

    #[test]
    fn factory_publishes_feed_and_task_writes_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let yaml = format!(
            "general:\n  data_dir: {}\ntemperature:\n  sensor_port: 0\n  collect_period: 0\n  zone_0: thermostat_a=Living Room\n  zone_1: thermostat_b=Bedroom\n",
            tmp.path().display()
        );
        let cfg = Config::from_str(&yaml).unwrap();
        let ctx = Arc::new(Context::new(&cfg).unwrap());

        let plugin = factory(ctx.clone(), &cfg);
        assert!(plugin.is_initialized());

        let feed = ctx.temperatures().unwrap();
        feed.apply_frame("thermostat_a:68.50");

        // une itération à période nulle écrit une ligne tout de suite
        let task = CollectTask {
            feed: feed.clone(),
            log: ValueLog::open(
                tmp.path().join("temperature"),
                "temperature",
                feed.zone_names(),
            )
            .unwrap(),
            channel: UdpChannel::bind(ctx.multicast_group(), 0, Duration::from_millis(50))
                .unwrap(),
            period: Duration::ZERO,
            last_row: Mutex::new(Instant::now()),
        };
        task.run_iteration(&WorkerCtl::for_tests("temperature")).unwrap();

        let today = std::fs::read_to_string(tmp.path().join("temperature/today.csv")).unwrap();
        let line = today.lines().last().unwrap();
        assert!(line.ends_with(",68.50,NaN"));
    }
}
