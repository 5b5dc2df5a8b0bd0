/**
 * HEARTH PLUGINS/SETPOINT - Consignes de température par zone
 *
 * RÔLE : Table zone vers consigne, persistée dans son propre fichier YAML
 * pour survivre aux redémarrages sans toucher à la configuration
 * principale. La consigne effective dépend de la présence : personne dont
 * les règles nomment la zone, on chauffe à la consigne d'absence.
 *
 * FONCTIONNEMENT : Valeurs bornées à [50,90] °F ; une valeur hors bornes ou
 * illisible retombe à 65 plutôt que de gelér ou cuire la maison sur une
 * faute de frappe. La commande `set_point,<zone>,<valeur>` passe par le
 * routeur, même chemin depuis UDP ou HTTP.
 */

use crate::config::Config;
use crate::context::Context;
use crate::plugins::Plugin;
use crate::plugins::presence::PresenceFeed;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub const MIN_SET_POINT: f64 = 50.0;
pub const MAX_SET_POINT: f64 = 90.0;
pub const DEFAULT_SET_POINT: f64 = 65.0;
pub const DEFAULT_AWAY_SET_POINT: f64 = 60.0;

pub(crate) struct UserRule {
    pub(crate) user: String,
    pub(crate) zones: Vec<String>,
}

pub struct SetPointFeed {
    file: PathBuf,
    away_set_point: f64,
    zones: Vec<String>,
    rules: Vec<UserRule>,
    presence: Arc<PresenceFeed>,
    table: Mutex<HashMap<String, f64>>,
}

fn normalize(zone: &str, value: f64) -> f64 {
    if (MIN_SET_POINT..=MAX_SET_POINT).contains(&value) {
        value
    } else {
        warn!(zone, value, "consigne hors bornes, retour à la valeur sûre");
        DEFAULT_SET_POINT
    }
}

impl SetPointFeed {
    pub(crate) fn load(
        file: PathBuf,
        away_set_point: f64,
        zones: Vec<String>,
        rules: Vec<UserRule>,
        presence: Arc<PresenceFeed>,
    ) -> Self {
        let mut table: HashMap<String, f64> = match std::fs::read_to_string(&file) {
            Ok(raw) => match serde_yaml::from_str::<HashMap<String, f64>>(&raw) {
                Ok(table) => table,
                Err(e) => {
                    warn!(file = %file.display(), "table de consignes illisible: {e}");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        for (zone, value) in table.iter_mut() {
            *value = normalize(zone, *value);
        }
        // toute zone connue a une consigne, fichier neuf compris
        for zone in &zones {
            table.entry(zone.clone()).or_insert(DEFAULT_SET_POINT);
        }

        let feed = Self {
            file,
            away_set_point,
            zones,
            rules,
            presence,
            table: Mutex::new(table),
        };
        feed.persist();
        feed
    }

    fn persist(&self) {
        let table = self.table.lock();
        match serde_yaml::to_string(&*table) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&self.file, raw) {
                    warn!(file = %self.file.display(), "écriture des consignes impossible: {e}");
                }
            }
            Err(e) => warn!("sérialisation des consignes impossible: {e}"),
        }
    }

    pub fn zone_names(&self) -> Vec<String> {
        self.zones.clone()
    }

    pub fn stored(&self, zone: &str) -> Option<f64> {
        self.table.lock().get(zone).copied()
    }

    /// Commande utilisateur : zone inconnue refusée, valeur illisible
    /// ramenée à la consigne par défaut, le tout persisté.
    pub fn set(&self, zone: &str, raw_value: &str) {
        if !self.zones.iter().any(|z| z == zone) {
            warn!(zone, "consigne pour une zone inconnue ignorée");
            return;
        }
        let value = match raw_value.trim().parse::<f64>() {
            Ok(value) => normalize(zone, value),
            Err(_) => {
                warn!(zone, raw_value, "valeur de consigne illisible");
                DEFAULT_SET_POINT
            }
        };
        self.table.lock().insert(zone.to_string(), value);
        self.persist();
        info!(zone, value, "consigne mise à jour");
    }

    /// Consigne d'absence, sauf si un présent a une règle nommant la zone.
    pub fn effective(&self, zone: &str) -> f64 {
        let occupied = self.rules.iter().any(|rule| {
            rule.zones.iter().any(|z| z == zone) && self.presence.is_user_home(&rule.user)
        });
        if occupied {
            self.stored(zone).unwrap_or(DEFAULT_SET_POINT)
        } else {
            self.away_set_point
        }
    }
}

pub struct SetPointPlugin {
    enabled: bool,
    initialized: bool,
    running: AtomicBool,
    feed: Option<Arc<SetPointFeed>>,
}

impl SetPointPlugin {
    fn bare(enabled: bool) -> Arc<dyn Plugin> {
        Arc::new(Self {
            enabled,
            initialized: false,
            running: AtomicBool::new(false),
            feed: None,
        })
    }
}

fn parse_rules(cfg: &Config) -> Vec<UserRule> {
    let mut rules = Vec::new();
    let mut n = 0;
    while let Some(pair) = cfg.get("setpoint", &format!("rule_{n}")) {
        match pair.split_once('=') {
            Some((user, zones)) => rules.push(UserRule {
                user: user.trim().to_string(),
                zones: zones.split(',').map(|z| z.trim().to_string()).collect(),
            }),
            None => warn!(pair, "règle attendue en `utilisateur=zone,zone`"),
        }
        n += 1;
    }
    rules
}

pub fn factory(ctx: Arc<Context>, cfg: &Config) -> Arc<dyn Plugin> {
    let enabled = cfg.enabled("setpoint");
    if !enabled {
        return SetPointPlugin::bare(enabled);
    }

    let Some(temperatures) = ctx.temperatures() else {
        warn!("flux de températures absent, consignes non initialisées");
        return SetPointPlugin::bare(enabled);
    };
    let Some(presence) = ctx.presence() else {
        warn!("flux de présence absent, consignes non initialisées");
        return SetPointPlugin::bare(enabled);
    };

    let file = cfg
        .get("setpoint", "set_point_file")
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.data_dir().join("set_points.yaml"));
    let away_set_point = cfg.get_f64_or("setpoint", "away_set_point", DEFAULT_AWAY_SET_POINT);

    let feed = Arc::new(SetPointFeed::load(
        file,
        away_set_point,
        temperatures.zone_names(),
        parse_rules(cfg),
        presence,
    ));

    let router_feed = feed.clone();
    ctx.router().register("set_point", move |msg| {
        let mut fields = msg.splitn(3, ',');
        let _topic = fields.next();
        match (fields.next(), fields.next()) {
            (Some(zone), Some(value)) => router_feed.set(zone.trim(), value),
            _ => warn!(msg, "commande set_point incomplète"),
        }
    });

    ctx.publish_set_points(feed.clone());
    info!(zones = feed.zones.len(), "unité consignes prête");
    Arc::new(SetPointPlugin {
        enabled,
        initialized: true,
        running: AtomicBool::new(false),
        feed: Some(feed),
    })
}

impl Plugin for SetPointPlugin {
    fn name(&self) -> &'static str {
        "setpoint"
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

    /// Unité passive : pas de fil, les commandes arrivent par le routeur.
    fn start(self: Arc<Self>) {
        if self.initialized {
            self.running.store(true, Ordering::SeqCst);
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn render_html(&self) -> String {
        let Some(feed) = &self.feed else {
            return String::new();
        };
        let mut rows = String::new();
        for zone in feed.zone_names() {
            let stored = feed.stored(&zone).unwrap_or(DEFAULT_SET_POINT);
            let effective = feed.effective(&zone);
            let input_id = format!("sp_{}", zone.replace(' ', "_"));
            rows.push_str(&format!(
                "<tr><td>{zone}</td><td>{effective:.1}</td>\
                 <td><input type=\"number\" id=\"{input_id}\" value=\"{stored:.1}\" \
                 min=\"{MIN_SET_POINT}\" max=\"{MAX_SET_POINT}\" step=\"0.5\"> \
                 <button onclick=\"send_set_point('{zone}', '{input_id}')\">Set</button></td></tr>\n"
            ));
        }
        format!(
            "<h2>Set points</h2>\n\
             <table class=\"status\"><tr><th>Zone</th><th>Effective</th><th>Stored</th></tr>\n\
             {rows}</table>\n"
        )
    }

    fn render_javascript(&self) -> String {
        if self.feed.is_none() {
            return String::new();
        }
        r#"
        function send_set_point(zone, input_id)
        {
            $.post('/control', { command: 'set_point,' + zone + ',' + $('#' + input_id).val() });
        }
        "#
        .to_string()
    }
}
