//! Page d'état des unités. Unité passive : elle ne fait que rendre le
//! tableau tenu à jour par le superviseur.

use crate::config::Config;
use crate::context::Context;
use crate::plugins::Plugin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub struct StatusPlugin {
    enabled: bool,
    initialized: bool,
    running: AtomicBool,
    ctx: Arc<Context>,
}

pub fn factory(ctx: Arc<Context>, cfg: &Config) -> Arc<dyn Plugin> {
    let enabled = cfg.enabled("status");
    if enabled {
        info!("unité état prête");
    }
    Arc::new(StatusPlugin {
        enabled,
        initialized: enabled,
        running: AtomicBool::new(false),
        ctx,
    })
}

impl Plugin for StatusPlugin {
    fn name(&self) -> &'static str {
        "status"
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
        if self.initialized {
            self.running.store(true, Ordering::SeqCst);
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn render_html(&self) -> String {
        let mut rows = String::new();
        for unit in self.ctx.status().snapshot() {
            let flag = |b: bool| if b { "yes" } else { "no" };
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                unit.name,
                flag(unit.enabled),
                flag(unit.initialized),
                flag(unit.running)
            ));
        }
        format!(
            "<h2>Units</h2>\n\
             <table class=\"status\">\n\
             <tr><th>Unit</th><th>Enabled</th><th>Initialized</th><th>Running</th></tr>\n\
             {rows}</table>\n"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::UnitStatus;

    fn context() -> Arc<Context> {
        let tmp = tempfile::tempdir().unwrap();
        let yaml = format!("general:\n  data_dir: {}\n", tmp.path().display());
        let cfg = Config::from_str(&yaml).unwrap();
        Arc::new(Context::new(&cfg).unwrap())
    }

    #[test]
    fn renders_the_board_snapshot() {
        let ctx = context();
        ctx.status().replace(vec![UnitStatus {
            name: "temperature".into(),
            enabled: true,
            initialized: true,
            running: false,
        }]);

        let cfg = Config::from_str("status: {}\n").unwrap();
        let plugin = factory(ctx, &cfg);
        assert!(plugin.is_initialized());

        let html = plugin.render_html();
        assert!(html.contains("<td>temperature</td><td>yes</td><td>yes</td><td>no</td>"));
    }

    #[test]
    fn missing_section_leaves_the_unit_disabled() {
        let cfg = Config::from_str("general: {}\n").unwrap();
        let plugin = factory(context(), &cfg);
        assert!(!plugin.is_enabled());
        assert!(!plugin.is_initialized());

        let cloned = plugin.clone();
        cloned.start();
        assert!(!plugin.is_running());
    }
}
