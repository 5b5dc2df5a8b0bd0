/**
 * HEARTH PLUGINS/MEMORY - Mémoire consommée par la machine hôte
 *
 * Échantillonne le pourcentage de mémoire utilisée à chaque période. Le
 * contrôleur vit sur une petite machine, la courbe dit quand ça dérive.
 */

use crate::config::Config;
use crate::context::Context;
use crate::datalog::value::ValueLog;
use crate::lifecycle::{PluginTask, Worker, WorkerCtl};
use crate::plugins::Plugin;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::System;
use tracing::warn;

struct SampleTask {
    log: ValueLog,
    system: Mutex<System>,
    period: u64,
}

impl SampleTask {
    fn used_percent(&self) -> f64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        system.used_memory() as f64 / total as f64 * 100.0
    }
}

impl PluginTask for SampleTask {
    fn run_iteration(&self, ctl: &WorkerCtl) -> anyhow::Result<()> {
        self.log.record(&[self.used_percent()]);
        ctl.pause(self.period);
        Ok(())
    }
}

pub struct MemoryPlugin {
    worker: Worker,
    enabled: bool,
    task: Option<Arc<SampleTask>>,
}

pub fn factory(ctx: Arc<Context>, cfg: &Config) -> Arc<dyn Plugin> {
    let worker = Worker::new("memory");
    let enabled = cfg.enabled("memory");
    if !enabled {
        return Arc::new(MemoryPlugin {
            worker,
            enabled,
            task: None,
        });
    }

    let period = cfg.get_u64_or("memory", "collect_period", 60);
    let log = match ValueLog::open(ctx.data_dir().join("memory"), "memory", vec!["Used %".into()])
    {
        Ok(log) => log,
        Err(e) => {
            warn!("journal mémoire indisponible: {e}");
            return Arc::new(MemoryPlugin {
                worker,
                enabled,
                task: None,
            });
        }
    };

    worker.mark_initialized();
    Arc::new(MemoryPlugin {
        worker,
        enabled,
        task: Some(Arc::new(SampleTask {
            log,
            system: Mutex::new(System::new()),
            period,
        })),
    })
}

impl Plugin for MemoryPlugin {
    fn name(&self) -> &'static str {
        "memory"
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
        "<h2>Host memory</h2>\n<div id=\"memory_chart_div\"></div>\n".to_string()
    }

    fn render_javascript(&self) -> String {
        let Some(task) = &self.task else {
            return String::new();
        };
        task.log.linechart_javascript(
            "memory",
            "Memory used (%)",
            "memory_chart_div",
            "/data/memory",
            ", vAxis: { viewWindow: { min: 0, max: 100 } }",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_lands_in_percent_range_and_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let yaml = format!(
            "general:\n  data_dir: {}\nmemory:\n  collect_period: 0\n",
            tmp.path().display()
        );
        let cfg = Config::from_str(&yaml).unwrap();
        let ctx = Arc::new(Context::new(&cfg).unwrap());

        let plugin = factory(ctx, &cfg);
        assert!(plugin.is_initialized());

        let task = SampleTask {
            log: ValueLog::open(tmp.path().join("memory"), "memory", vec!["Used %".into()])
                .unwrap(),
            system: Mutex::new(System::new()),
            period: 0,
        };
        let pct = task.used_percent();
        assert!((0.0..=100.0).contains(&pct), "pct = {pct}");

        task.run_iteration(&WorkerCtl::for_tests("memory")).unwrap();
        let today = std::fs::read_to_string(tmp.path().join("memory/today.csv")).unwrap();
        assert_eq!(today.lines().count(), 1);
    }

    #[test]
    fn disabled_section_stays_out_of_the_way() {
        let cfg = Config::from_str("memory:\n  enabled: false\n").unwrap();
        let ctx = Arc::new(Context::new(&cfg).unwrap());
        let plugin = factory(ctx, &cfg);
        assert!(!plugin.is_enabled());
        assert!(!plugin.is_initialized());
        assert_eq!(plugin.render_html(), "");
    }
}
