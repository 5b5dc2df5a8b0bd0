/**
 * HEARTH SUPERVISOR - Construction ordonnée et cycle de vie des unités
 *
 * RÔLE : Résout l'ordre de construction à partir des prérequis déclarés,
 * fabrique chaque unité dans cet ordre, saute les dépendants d'un prérequis
 * manquant ou resté non initialisé, puis pilote démarrage et arrêt. L'arrêt
 * déroule l'ordre de construction à l'envers.
 *
 * FONCTIONNEMENT : Les unités vivent dans un tableau indexé par l'ordre de
 * déclaration (qui est aussi l'ordre de rendu de la page d'état) ; l'ordre
 * de construction est gardé à part. Le tableau d'état partagé est refait à
 * chaque rendu, une unité sautée y figure comme non initialisée.
 */

use crate::config::Config;
use crate::context::{Context, UnitStatus};
use crate::plugins::{self, Plugin, PluginDescriptor};
use crate::registry::{self, DependencyError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Supervisor {
    ctx: Arc<Context>,
    names: Vec<&'static str>,
    enabled: Vec<bool>,
    units: Vec<Option<Arc<dyn Plugin>>>,
    construction: Vec<usize>,
    started: AtomicBool,
}

impl Supervisor {
    /// Construit toutes les unités embarquées dans l'ordre résolu. Une
    /// erreur de dépendance (cycle, prérequis inconnu) est fatale : mieux
    /// vaut refuser de démarrer que servir une maison à moitié câblée.
    pub fn load(cfg: &Config, ctx: Arc<Context>) -> Result<Self, DependencyError> {
        Self::assemble(plugins::builtin(), cfg, ctx)
    }

    fn assemble(
        descriptors: Vec<PluginDescriptor>,
        cfg: &Config,
        ctx: Arc<Context>,
    ) -> Result<Self, DependencyError> {
        let order = registry::resolve(&descriptors)?;
        let index_of: HashMap<&str, usize> = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name, i))
            .collect();

        let mut units: Vec<Option<Arc<dyn Plugin>>> = vec![None; descriptors.len()];
        let mut construction = Vec::with_capacity(order.len());
        for idx in order {
            let descriptor = &descriptors[idx];
            let missing = descriptor.depends_on.iter().copied().find(|dep| {
                !index_of.get(dep).is_some_and(|&j| match &units[j] {
                    Some(unit) => unit.is_enabled() && unit.is_initialized(),
                    None => false,
                })
            });
            if let Some(dep) = missing {
                warn!(
                    unit = descriptor.name,
                    requires = dep,
                    "unité sautée, prérequis indisponible"
                );
                continue;
            }
            units[idx] = Some((descriptor.factory)(ctx.clone(), cfg));
            construction.push(idx);
        }

        let supervisor = Self {
            ctx,
            names: descriptors.iter().map(|d| d.name).collect(),
            enabled: descriptors.iter().map(|d| cfg.enabled(d.name)).collect(),
            units,
            construction,
            started: AtomicBool::new(false),
        };
        supervisor.refresh_status();
        Ok(supervisor)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        descriptors: Vec<PluginDescriptor>,
        cfg: &Config,
        ctx: Arc<Context>,
    ) -> Result<Self, DependencyError> {
        Self::assemble(descriptors, cfg, ctx)
    }

    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        for &idx in &self.construction {
            if let Some(unit) = &self.units[idx] {
                unit.clone().start();
            }
        }
        self.refresh_status();
        self.ctx.broadcast("hearth:up:kernel");
        info!(units = self.construction.len(), "unités démarrées");
    }

    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.ctx.broadcast("hearth:down:kernel");
        for &idx in self.construction.iter().rev() {
            if let Some(unit) = &self.units[idx] {
                unit.stop();
            }
        }
        self.refresh_status();
        info!("unités arrêtées");
    }

    /// Refait le tableau d'état partagé, une ligne par unité déclarée.
    pub fn refresh_status(&self) {
        let rows = self
            .names
            .iter()
            .enumerate()
            .map(|(idx, name)| match &self.units[idx] {
                Some(unit) => UnitStatus {
                    name: name.to_string(),
                    enabled: unit.is_enabled(),
                    initialized: unit.is_initialized(),
                    running: unit.is_running(),
                },
                None => UnitStatus {
                    name: name.to_string(),
                    enabled: self.enabled[idx],
                    initialized: false,
                    running: false,
                },
            })
            .collect();
        self.ctx.status().replace(rows);
    }

    /// Fragments HTML des unités, dans l'ordre de déclaration.
    pub fn render_html(&self) -> String {
        self.refresh_status();
        let mut page = String::new();
        for unit in self.units.iter().flatten() {
            page.push_str(&unit.render_html());
        }
        page
    }

    pub fn render_javascript(&self) -> String {
        let mut script = String::new();
        for unit in self.units.iter().flatten() {
            script.push_str(&unit.render_javascript());
        }
        script
    }
}
