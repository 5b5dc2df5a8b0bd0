/**
 * HEARTH PLUGINS/PRESENCE - Qui est à la maison
 *
 * RÔLE : Sonde le réseau local (arp-scan par défaut) et cherche les
 * adresses MAC déclarées. Un utilisateur est présent si sa MAC est apparue
 * dans la fenêtre `away_timeout` ; un téléphone en veille rate des scans,
 * la fenêtre absorbe ces trous.
 *
 * À chaque passage not-home vers home, une annonce part sur le canal de
 * diffusion pour les unités des autres machines.
 */

use crate::config::Config;
use crate::context::Context;
use crate::datalog::presence::PresenceLog;
use crate::lifecycle::{PluginTask, Worker, WorkerCtl};
use crate::plugins::{required_param, Plugin};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

struct TrackedUser {
    name: String,
    mac: String,
}

pub struct PresenceFeed {
    away_timeout: Duration,
    users: Vec<TrackedUser>,
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl PresenceFeed {
    fn new(users: Vec<TrackedUser>, away_timeout: Duration) -> Self {
        Self {
            away_timeout,
            users,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(pairs: &[(&str, &str)], away_timeout: Duration) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(name, mac)| TrackedUser {
                    name: name.to_string(),
                    mac: mac.to_lowercase(),
                })
                .collect(),
            away_timeout,
        )
    }

    pub fn user_names(&self) -> Vec<String> {
        self.users.iter().map(|u| u.name.clone()).collect()
    }

    pub fn is_user_home(&self, name: &str) -> bool {
        self.last_seen
            .lock()
            .get(name)
            .is_some_and(|at| at.elapsed() < self.away_timeout)
    }

    pub fn someone_home(&self) -> bool {
        self.users.iter().any(|u| self.is_user_home(&u.name))
    }

    pub fn home_users(&self) -> Vec<String> {
        self.users
            .iter()
            .filter(|u| self.is_user_home(&u.name))
            .map(|u| u.name.clone())
            .collect()
    }

    pub(crate) fn mark_seen(&self, name: &str) {
        self.last_seen.lock().insert(name.to_string(), Instant::now());
    }

    /// Pointe les MAC trouvées dans la sortie de sonde et rend les arrivées
    /// (absent au scan précédent, présent maintenant).
    pub(crate) fn apply_probe(&self, output: &str) -> Vec<String> {
        let before: HashSet<String> = self.home_users().into_iter().collect();
        let haystack = output.to_lowercase();
        for user in &self.users {
            if haystack.contains(&user.mac) {
                self.mark_seen(&user.name);
            }
        }
        self.home_users()
            .into_iter()
            .filter(|name| !before.contains(name))
            .collect()
    }
}

struct ProbeTask {
    ctx: Arc<Context>,
    feed: Arc<PresenceFeed>,
    log: PresenceLog,
    probe_argv: Vec<String>,
    period: u64,
}

impl ProbeTask {
    fn probe_output(&self) -> String {
        let (program, args) = match self.probe_argv.split_first() {
            Some(split) => split,
            None => return String::new(),
        };
        match Command::new(program).args(args).output() {
            Ok(out) => String::from_utf8_lossy(&out.stdout).into_owned(),
            Err(e) => {
                warn!(program, "sonde de présence en échec: {e}");
                String::new()
            }
        }
    }
}

impl PluginTask for ProbeTask {
    fn run_iteration(&self, ctl: &WorkerCtl) -> anyhow::Result<()> {
        let output = self.probe_output();
        for name in self.feed.apply_probe(&output) {
            info!(user = %name, "arrivée détectée");
            self.ctx.broadcast(&format!("{name}:home:presence"));
        }
        // la ligne part même vide, l'absence ferme les intervalles
        self.log.record(&self.feed.home_users());
        ctl.pause(self.period);
        Ok(())
    }
}

pub struct PresencePlugin {
    worker: Worker,
    enabled: bool,
    feed: Option<Arc<PresenceFeed>>,
    task: Option<Arc<ProbeTask>>,
}

impl PresencePlugin {
    fn bare(worker: Worker, enabled: bool) -> Arc<dyn Plugin> {
        Arc::new(Self {
            worker,
            enabled,
            feed: None,
            task: None,
        })
    }
}

fn parse_users(cfg: &Config) -> Option<Vec<TrackedUser>> {
    required_param(cfg, "presence", "user_0")?;
    let mut users = Vec::new();
    let mut n = 0;
    while let Some(pair) = cfg.get("presence", &format!("user_{n}")) {
        let Some((name, mac)) = pair.split_once('=') else {
            warn!(pair, "utilisateur attendu en `nom=MAC`");
            return None;
        };
        users.push(TrackedUser {
            name: name.trim().to_string(),
            mac: mac.trim().to_lowercase(),
        });
        n += 1;
    }
    Some(users)
}

pub fn factory(ctx: Arc<Context>, cfg: &Config) -> Arc<dyn Plugin> {
    let worker = Worker::new("presence");
    let enabled = cfg.enabled("presence");
    if !enabled {
        return PresencePlugin::bare(worker, enabled);
    }

    let Some(users) = parse_users(cfg) else {
        return PresencePlugin::bare(worker, enabled);
    };
    let probe_command = cfg
        .get("presence", "probe_command")
        .unwrap_or("arp-scan -l");
    let probe_argv = match shell_words::split(probe_command) {
        Ok(argv) if !argv.is_empty() => argv,
        Ok(_) => {
            warn!("commande de sonde vide");
            return PresencePlugin::bare(worker, enabled);
        }
        Err(e) => {
            warn!(probe_command, "commande de sonde invalide: {e}");
            return PresencePlugin::bare(worker, enabled);
        }
    };
    let period = cfg.get_u64_or("presence", "collect_period", 30);
    let away_timeout = Duration::from_secs(cfg.get_u64_or("presence", "away_timeout", 600));

    let feed = Arc::new(PresenceFeed::new(users, away_timeout));
    let log = match PresenceLog::open(
        ctx.data_dir().join("presence"),
        "presence",
        feed.user_names(),
    ) {
        Ok(log) => log,
        Err(e) => {
            warn!("journal de présence indisponible: {e}");
            return PresencePlugin::bare(worker, enabled);
        }
    };

    info!(users = feed.users.len(), "unité présence prête");
    ctx.publish_presence(feed.clone());
    worker.mark_initialized();

    Arc::new(PresencePlugin {
        worker,
        enabled,
        feed: Some(feed.clone()),
        task: Some(Arc::new(ProbeTask {
            ctx,
            feed,
            log,
            probe_argv,
            period,
        })),
    })
}

impl Plugin for PresencePlugin {
    fn name(&self) -> &'static str {
        "presence"
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
        for name in feed.user_names() {
            let state = if feed.is_user_home(&name) { "home" } else { "away" };
            rows.push_str(&format!("<tr><td>{name}</td><td>{state}</td></tr>\n"));
        }
        format!(
            "<h2>Presence</h2>\n\
             <table class=\"status\"><tr><th>User</th><th>State</th></tr>\n{rows}</table>\n\
             <div id=\"presence_chart_div\"></div>\n"
        )
    }

    fn render_javascript(&self) -> String {
        let Some(task) = &self.task else {
            return String::new();
        };
        task.log
            .timeline_javascript("presence", "User", "presence_chart_div")
    }
}
