/**
 * HEARTH KERNEL - Point d'entrée du contrôleur domestique
 *
 * RÔLE : Bootstrap complet : variables d'environnement, journalisation,
 * configuration, contexte partagé, construction ordonnée des unités puis
 * serveur HTTP. Une erreur dans la table des unités (cycle, prérequis
 * inconnu) refuse le démarrage plutôt que de servir une maison à moitié
 * câblée.
 *
 * FONCTIONNEMENT : `--template` imprime une configuration de départ et
 * sort. Sinon la configuration vient de HEARTH_CONFIG (défaut
 * hearth.yaml), les unités démarrent dans l'ordre résolu et s'arrêtent en
 * ordre inverse quand le serveur HTTP rend la main (Ctrl-C).
 */

mod alarm;
mod commands;
mod config;
mod context;
mod datalog;
mod http;
mod lifecycle;
mod net;
mod notify;
mod plugins;
mod registry;
mod supervisor;

use crate::config::Config;
use crate::context::Context;
use crate::http::AppState;
use crate::supervisor::Supervisor;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if std::env::args().any(|arg| arg == "--template") {
        print!("{}", plugins::template_config());
        return Ok(());
    }

    let cfg = Config::load();
    let ctx = Arc::new(Context::new(&cfg)?);

    let supervisor = match Supervisor::load(&cfg, ctx.clone()) {
        Ok(supervisor) => Arc::new(supervisor),
        Err(e) => {
            error!("table des unités invalide: {e}");
            return Err(e.into());
        }
    };
    supervisor.start();

    let bind_address = cfg
        .get("general", "bind_address")
        .unwrap_or("0.0.0.0:8080")
        .to_string();
    let state = AppState {
        supervisor: supervisor.clone(),
        ctx,
        started: Instant::now(),
    };
    let served = http::serve(&bind_address, state).await;

    supervisor.stop();
    served
}
