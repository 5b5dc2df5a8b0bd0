/**
 * HEARTH HTTP - Page d'état et entrée de commandes
 *
 * RÔLE : Sert la page d'état composée des fragments d'unités, le JavaScript
 * des graphes (Google Charts, alimentés côté client par jQuery), la santé
 * du noyau en JSON, et reçoit les commandes du navigateur pour les pousser
 * dans le routeur interne.
 *
 * FONCTIONNEMENT : Serveur Axum sur l'adresse de la section general. Les
 * journaux du jour sont servis tels quels sous /data/{prefix} ; le
 * navigateur les dépouille lui-même pour tracer les courbes.
 */

use crate::context::{Context, UnitStatus};
use crate::supervisor::Supervisor;
use axum::extract::{Path, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub ctx: Arc<Context>,
    pub started: Instant,
}

#[derive(serde::Serialize)]
struct KernelHealth {
    uptime_seconds: u64,
    units: Vec<UnitStatus>,
}

#[derive(Debug, Deserialize)]
struct ControlForm {
    command: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/status/html", get(get_status_page))
        .route("/status/javascript", get(get_status_javascript))
        .route("/control", post(post_control))
        .route("/data/{prefix}", get(get_today_csv))
        .with_state(state)
}

pub async fn serve(bind_address: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(addr = %listener.local_addr()?, "HTTP en écoute");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("arrêt demandé");
        })
        .await?;
    Ok(())
}

// GET /system/health (uptime + tableau des unités)
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    app.supervisor.refresh_status();
    Json(KernelHealth {
        uptime_seconds: app.started.elapsed().as_secs(),
        units: app.ctx.status().snapshot(),
    })
}

// GET /status/html (la page, fragments d'unités dans l'ordre de déclaration)
async fn get_status_page(State(app): State<AppState>) -> Html<String> {
    let body = app.supervisor.render_html();
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>Hearth</title>\n\
         <script src=\"https://ajax.googleapis.com/ajax/libs/jquery/3.7.1/jquery.min.js\"></script>\n\
         <script src=\"https://www.gstatic.com/charts/loader.js\"></script>\n\
         <script src=\"/status/javascript\"></script>\n\
         <style>\n\
         body {{ font-family: sans-serif; }}\n\
         table.status {{ border-collapse: collapse; }}\n\
         table.status td, table.status th {{ border: 1px solid #999; padding: 4px 8px; }}\n\
         </style>\n\
         </head>\n<body>\n<h1>Hearth</h1>\n{body}</body>\n</html>\n"
    ))
}

// GET /status/javascript (chargeur Google Charts + fragments d'unités)
async fn get_status_javascript(
    State(app): State<AppState>,
) -> ([(HeaderName, &'static str); 1], String) {
    let fragments = app.supervisor.render_javascript();
    let script = format!(
        "google.charts.load('current', {{ packages: ['corechart', 'timeline'] }});\n\
         var ready_function_array = [];\n\
         google.charts.setOnLoadCallback(function() {{\n\
           ready_function_array.forEach(function(draw) {{ draw(); }});\n\
         }});\n\n{fragments}"
    );
    ([(header::CONTENT_TYPE, "application/javascript")], script)
}

// POST /control (formulaire command=..., poussé tel quel dans le routeur)
async fn post_control(
    State(app): State<AppState>,
    Form(form): Form<ControlForm>,
) -> StatusCode {
    app.ctx.router().dispatch(&form.command);
    StatusCode::NO_CONTENT
}

// GET /data/{prefix} (journal du jour, dépouillé côté navigateur)
async fn get_today_csv(
    State(app): State<AppState>,
    Path(prefix): Path<String>,
) -> Result<([(HeaderName, &'static str); 1], String), StatusCode> {
    // le préfixe vient de l'URL, on ne le laisse pas sortir de data_dir
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StatusCode::NOT_FOUND);
    }
    let path = app.ctx.data_dir().join(&prefix).join("today.csv");
    match std::fs::read_to_string(&path) {
        Ok(body) => Ok(([(header::CONTENT_TYPE, "text/csv")], body)),
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}
