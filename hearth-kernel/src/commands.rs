/**
 * HEARTH COMMANDS - Routeur de commandes utilisateur
 *
 * Messages `topic,arg,arg,...` venus du port de commande UDP ou du POST
 * /control. Le routeur ne connaît que le premier champ ; chaque abonné
 * re-découpe le message complet à sa façon.
 */

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};

type Callback = Box<dyn Fn(&str) + Send + Sync>;

pub struct CommandRouter {
    callbacks: Mutex<HashMap<String, Vec<Callback>>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, topic: &str, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(Box::new(callback));
    }

    /// Le message complet est transmis à chaque abonné du topic. Topic
    /// inconnu : avertissement, message abandonné.
    pub fn dispatch(&self, message: &str) {
        let message = message.trim();
        if message.is_empty() {
            warn!("commande vide ignorée");
            return;
        }

        let topic = message.split(',').next().unwrap_or(message);
        let callbacks = self.callbacks.lock();
        match callbacks.get(topic) {
            Some(subscribers) => {
                debug!(topic, "commande routée");
                for callback in subscribers {
                    callback(message);
                }
            }
            None => warn!(topic, "topic de commande inconnu"),
        }
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.callbacks.lock().keys().cloned().collect();
        topics.sort();
        topics
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}
