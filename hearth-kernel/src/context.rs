/**
 * HEARTH CONTEXT - Services partagés entre unités
 *
 * RÔLE : Porte le canal de diffusion, le routeur de commandes, le notifieur
 * et les flux publiés en lecture (températures, présence, consignes). Les
 * unités ne se connaissent pas entre elles : un producteur publie son flux
 * à la construction, un dépendant le retrouve ici au même moment.
 *
 * Chaque flux est auto-verrouillé ; le contexte ne pose aucun verrou global.
 */

use crate::commands::CommandRouter;
use crate::config::Config;
use crate::net::{self, MulticastSender};
use crate::notify::{self, Notifier};
use crate::plugins::presence::PresenceFeed;
use crate::plugins::setpoint::SetPointFeed;
use crate::plugins::temperature::TemperatureFeed;
use parking_lot::Mutex;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Ligne du tableau d'état des unités, figée par le superviseur après
/// chaque changement de cycle de vie.
#[derive(Debug, Clone, Serialize)]
pub struct UnitStatus {
    pub name: String,
    pub enabled: bool,
    pub initialized: bool,
    pub running: bool,
}

#[derive(Default)]
pub struct StatusBoard {
    rows: Mutex<Vec<UnitStatus>>,
}

impl StatusBoard {
    pub fn replace(&self, rows: Vec<UnitStatus>) {
        *self.rows.lock() = rows;
    }

    pub fn snapshot(&self) -> Vec<UnitStatus> {
        self.rows.lock().clone()
    }
}

pub struct Context {
    data_dir: PathBuf,
    multicast_group: Ipv4Addr,
    broadcast: MulticastSender,
    router: Arc<CommandRouter>,
    notifier: Arc<dyn Notifier>,
    status: StatusBoard,
    temperatures: Mutex<Option<Arc<TemperatureFeed>>>,
    presence: Mutex<Option<Arc<PresenceFeed>>>,
    set_points: Mutex<Option<Arc<SetPointFeed>>>,
}

impl Context {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let data_dir = PathBuf::from(cfg.get("general", "data_dir").unwrap_or("data"));
        let multicast_group = match cfg.get("general", "multicast_group") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(raw, "groupe multicast illisible, groupe par défaut");
                net::DEFAULT_GROUP
            }),
            None => net::DEFAULT_GROUP,
        };
        let announce_port =
            cfg.get_u64_or("general", "announce_port", net::ANNOUNCE_PORT as u64) as u16;
        let broadcast = MulticastSender::new(multicast_group, announce_port)?;

        Ok(Self {
            data_dir,
            multicast_group,
            broadcast,
            router: Arc::new(CommandRouter::new()),
            notifier: notify::from_config(cfg),
            status: StatusBoard::default(),
            temperatures: Mutex::new(None),
            presence: Mutex::new(None),
            set_points: Mutex::new(None),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn multicast_group(&self) -> Ipv4Addr {
        self.multicast_group
    }

    pub fn broadcast(&self, msg: &str) {
        self.broadcast.send(msg);
    }

    pub fn router(&self) -> &Arc<CommandRouter> {
        &self.router
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn publish_temperatures(&self, feed: Arc<TemperatureFeed>) {
        *self.temperatures.lock() = Some(feed);
    }

    pub fn temperatures(&self) -> Option<Arc<TemperatureFeed>> {
        self.temperatures.lock().clone()
    }

    pub fn publish_presence(&self, feed: Arc<PresenceFeed>) {
        *self.presence.lock() = Some(feed);
    }

    pub fn presence(&self) -> Option<Arc<PresenceFeed>> {
        self.presence.lock().clone()
    }

    pub fn publish_set_points(&self, feed: Arc<SetPointFeed>) {
        *self.set_points.lock() = Some(feed);
    }

    pub fn set_points(&self) -> Option<Arc<SetPointFeed>> {
        self.set_points.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_has_empty_feeds_and_board() {
        let ctx = Context::new(&Config::empty()).unwrap();
        assert!(ctx.temperatures().is_none());
        assert!(ctx.presence().is_none());
        assert!(ctx.set_points().is_none());
        assert!(ctx.status().snapshot().is_empty());
        assert_eq!(ctx.multicast_group(), net::DEFAULT_GROUP);
        ctx.broadcast("hearth:smoke");
    }

    #[test]
    fn status_board_replace_overwrites_previous_rows() {
        let board = StatusBoard::default();
        board.replace(vec![UnitStatus {
            name: "temperature".into(),
            enabled: true,
            initialized: true,
            running: false,
        }]);
        board.replace(vec![
            UnitStatus {
                name: "temperature".into(),
                enabled: true,
                initialized: true,
                running: true,
            },
            UnitStatus {
                name: "furnace".into(),
                enabled: false,
                initialized: false,
                running: false,
            },
        ]);

        let rows = board.snapshot();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].running);
        assert!(!rows[1].enabled);
    }
}
