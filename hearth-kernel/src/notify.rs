/**
 * HEARTH NOTIFY - Notification urgente d'un humain
 *
 * RÔLE : Couture pour prévenir quelqu'un (SMS ou équivalent) quand l'alarme
 * monte. La commande externe est configurée en gabarit ; sans configuration
 * on retombe sur le journal, jamais sur un échec silencieux.
 */

use crate::config::Config;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Gabarit découpé d'abord, substitué ensuite : un message avec espaces ou
/// quotes reste un seul argument.
pub(crate) fn substituted_argv(
    template: &str,
    substitutions: &[(&str, &str)],
) -> Result<Vec<String>, shell_words::ParseError> {
    let argv = shell_words::split(template)?;
    Ok(argv
        .into_iter()
        .map(|arg| {
            substitutions
                .iter()
                .fold(arg, |acc, (key, value)| acc.replace(key, value))
        })
        .collect())
}

/// Lancement sans attente ; un fil moissonneur évite les zombies.
pub(crate) fn spawn_detached(argv: &[String]) {
    let Some((program, args)) = argv.split_first() else {
        warn!("gabarit de commande vide");
        return;
    };
    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(mut child) => {
            debug!(program, "commande externe lancée");
            std::thread::spawn(move || {
                let _ = child.wait();
            });
        }
        Err(e) => warn!(program, "lancement impossible: {e}"),
    }
}

pub struct CommandNotifier {
    template: String,
    number: String,
}

impl CommandNotifier {
    pub fn new(template: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            number: number.into(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, message: &str) {
        let substitutions = [("{number}", self.number.as_str()), ("{message}", message)];
        match substituted_argv(&self.template, &substitutions) {
            Ok(argv) => spawn_detached(&argv),
            Err(e) => warn!("gabarit de notification invalide: {e}"),
        }
    }
}

/// Repli : trace en WARN pour rester visible même en filtrage serré.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!("NOTIFICATION: {message}");
    }
}

pub fn from_config(cfg: &Config) -> Arc<dyn Notifier> {
    match cfg.get("notify", "command") {
        Some(template) => {
            let number = cfg.get("notify", "number").unwrap_or_default();
            Arc::new(CommandNotifier::new(template, number))
        }
        None => {
            info!("pas de commande de notification configurée, journal seul");
            Arc::new(LogNotifier)
        }
    }
}
