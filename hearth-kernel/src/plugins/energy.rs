/**
 * HEARTH PLUGINS/ENERGY - Consommation électrique relevée en radio
 *
 * RÔLE : Pilote un collecteur externe type rtlamr qui décode les trames du
 * compteur et les écrit en JSON sur sa sortie standard. Un fil lecteur
 * pompe les lignes vers un canal ; l'itération draine le canal avec un
 * timeout court et ne retient que notre numéro de série (le récepteur
 * entend tout le quartier).
 *
 * Le compteur publie un index cumulatif en centièmes de kWh ; on journalise
 * l'index en kWh et l'historique par jour se calcule première/dernière
 * ligne de chaque archive.
 */

use crate::config::Config;
use crate::context::Context;
use crate::datalog::value::{ArchiveDaySummary, ValueLog};
use crate::lifecycle::{PluginTask, Worker, WorkerCtl};
use crate::plugins::{required_param, Plugin};
use anyhow::bail;
use parking_lot::Mutex;
use std::io::BufRead;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

fn parse_reading(line: &str, meter_serial: u64) -> Option<f64> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let message = value.get("Message")?;
    if message.get("ERTSerialNumber")?.as_u64()? != meter_serial {
        return None;
    }
    Some(message.get("LastConsumptionCount")?.as_f64()? / 100.0)
}

/// `['03/10', 4.25],` par jour archivé, consommation bornée à zéro quand
/// le compteur repart en arrière (remplacement, rollover).
fn history_rows(summaries: &[ArchiveDaySummary]) -> String {
    let mut rows = String::new();
    for day in summaries {
        let (Some(first), Some(last)) = (day.first.first(), day.last.first()) else {
            continue;
        };
        let used = (last - first).max(0.0);
        rows.push_str(&format!(
            "['{}', {:.2}],\n",
            day.date.format("%m/%d"),
            used
        ));
    }
    rows
}

struct MeterTask {
    child: Mutex<Child>,
    lines: Mutex<Receiver<String>>,
    log: ValueLog,
    meter_serial: u64,
}

impl PluginTask for MeterTask {
    fn run_iteration(&self, _ctl: &WorkerCtl) -> anyhow::Result<()> {
        let line = match self.lines.lock().recv_timeout(Duration::from_secs(1)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => return Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                bail!("le collecteur a fermé sa sortie")
            }
        };
        match parse_reading(&line, self.meter_serial) {
            Some(kwh) => self.log.record(&[kwh]),
            None => debug!(%line, "ligne du collecteur ignorée"),
        }
        Ok(())
    }

    fn cleanup(&self) {
        let mut child = self.child.lock();
        if let Err(e) = child.kill() {
            debug!("collecteur déjà terminé: {e}");
        }
        let _ = child.wait();
    }
}

pub struct EnergyPlugin {
    worker: Worker,
    enabled: bool,
    task: Option<Arc<MeterTask>>,
}

impl EnergyPlugin {
    fn bare(worker: Worker, enabled: bool) -> Arc<dyn Plugin> {
        Arc::new(Self {
            worker,
            enabled,
            task: None,
        })
    }
}

pub fn factory(ctx: Arc<Context>, cfg: &Config) -> Arc<dyn Plugin> {
    let worker = Worker::new("energy");
    let enabled = cfg.enabled("energy");
    if !enabled {
        return EnergyPlugin::bare(worker, enabled);
    }

    let Some(collector_command) = required_param(cfg, "energy", "collector_command") else {
        return EnergyPlugin::bare(worker, enabled);
    };
    let Some(raw_serial) = required_param(cfg, "energy", "meter_serial") else {
        return EnergyPlugin::bare(worker, enabled);
    };
    let Ok(meter_serial) = raw_serial.parse::<u64>() else {
        warn!(%raw_serial, "numéro de série de compteur illisible");
        return EnergyPlugin::bare(worker, enabled);
    };

    let argv = match shell_words::split(&collector_command) {
        Ok(argv) if !argv.is_empty() => argv,
        _ => {
            warn!(%collector_command, "commande de collecteur invalide");
            return EnergyPlugin::bare(worker, enabled);
        }
    };

    let mut child = match Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(program = %argv[0], "lancement du collecteur impossible: {e}");
            return EnergyPlugin::bare(worker, enabled);
        }
    };

    let Some(stdout) = child.stdout.take() else {
        warn!("sortie du collecteur non capturée");
        let _ = child.kill();
        let _ = child.wait();
        return EnergyPlugin::bare(worker, enabled);
    };

    let log = match ValueLog::open(ctx.data_dir().join("energy"), "energy", vec!["kWh".into()]) {
        Ok(log) => log,
        Err(e) => {
            warn!("journal d'énergie indisponible: {e}");
            let _ = child.kill();
            let _ = child.wait();
            return EnergyPlugin::bare(worker, enabled);
        }
    };

    let (tx, rx) = std::sync::mpsc::channel();
    let reader = std::thread::Builder::new()
        .name("energy-reader".to_string())
        .spawn(move || {
            let reader = std::io::BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = reader {
        warn!("fil lecteur du collecteur impossible: {e}");
        let _ = child.kill();
        let _ = child.wait();
        return EnergyPlugin::bare(worker, enabled);
    }

    info!(meter_serial, "unité énergie prête");
    worker.mark_initialized();
    Arc::new(EnergyPlugin {
        worker,
        enabled,
        task: Some(Arc::new(MeterTask {
            child: Mutex::new(child),
            lines: Mutex::new(rx),
            log,
            meter_serial,
        })),
    })
}

impl Plugin for EnergyPlugin {
    fn name(&self) -> &'static str {
        "energy"
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
        if self.task.is_none() {
            return String::new();
        }
        "<h2>Energy</h2>\n\
         <div id=\"energy_chart_div\"></div>\n\
         <div id=\"energy_history_div\"></div>\n"
            .to_string()
    }

    fn render_javascript(&self) -> String {
        let Some(task) = &self.task else {
            return String::new();
        };
        let today = task.log.linechart_javascript(
            "energy",
            "Meter reading (kWh)",
            "energy_chart_div",
            "/data/energy",
            "",
        );
        let history = format!(
            r#"
        function draw_energy_history()
        {{
            var data = google.visualization.arrayToDataTable([
                ['Day', 'kWh'],
                {rows}
            ]);
            var options = {{ title: 'Daily usage (kWh)', legend: {{ position: 'none' }} }};
            var chart = new google.visualization.ColumnChart(document.getElementById('energy_history_div'));
            chart.draw(data, options);
        }}

        ready_function_array.push( draw_energy_history )
        "#,
            rows = history_rows(&task.log.archive_summaries()),
        );
        format!("{today}\n{history}")
    }
}
