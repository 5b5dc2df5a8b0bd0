/**
 * HEARTH CONFIG - Configuration par sections clé/valeur
 *
 * RÔLE : Charger le document YAML unique (une section par unité, adressée par
 * le nom de l'unité) dans un store générique. Les clés reconnues sont propres
 * à chaque unité et validées par elle à la construction.
 *
 * FONCTIONNEMENT : Chemin via HEARTH_CONFIG (défaut hearth.yaml). Fichier
 * absent ou invalide -> store vide + warning : chaque unité échoue alors son
 * initialisation individuellement, le processus continue de servir sa page
 * de statut.
 */

use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("section `{0}` missing from configuration")]
    MissingSection(String),
    #[error("key `{key}` missing from section `{section}`")]
    MissingKey { section: String, key: String },
    #[error("key `{key}` in section `{section}` is not a valid {expected}: `{value}`")]
    InvalidValue {
        section: String,
        key: String,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse un document YAML : mapping de sections -> mapping clé/scalaire.
    pub fn from_str(text: &str) -> Result<Self, serde_yaml::Error> {
        let doc: Value = serde_yaml::from_str(text)?;
        let mut sections = HashMap::new();

        if let Value::Mapping(top) = doc {
            for (name, body) in top {
                let Some(name) = scalar_to_string(&name) else {
                    continue;
                };
                let mut entries = HashMap::new();
                if let Value::Mapping(map) = body {
                    for (key, value) in map {
                        let (Some(key), Some(value)) =
                            (scalar_to_string(&key), scalar_to_string(&value))
                        else {
                            warn!(section = %name, "ignoring non-scalar config entry");
                            continue;
                        };
                        entries.insert(key, value);
                    }
                }
                sections.insert(name, entries);
            }
        }

        Ok(Self { sections })
    }

    /// Chargement au démarrage ; ne panique jamais, un souci = store vide.
    pub fn load() -> Self {
        let path = std::env::var("HEARTH_CONFIG").unwrap_or_else(|_| "hearth.yaml".into());
        if !Path::new(&path).exists() {
            warn!(path = %path, "no configuration file, starting with empty config");
            return Self::empty();
        }
        let text = std::fs::read_to_string(&path).unwrap_or_default();
        if text.trim().is_empty() {
            warn!(path = %path, "configuration file is empty");
            return Self::empty();
        }
        Self::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %path, "invalid configuration: {e}");
            Self::empty()
        })
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn require(&self, section: &str, key: &str) -> Result<&str, ConfigError> {
        if !self.has_section(section) {
            return Err(ConfigError::MissingSection(section.to_string()));
        }
        self.get(section, key).ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
    }

    pub fn require_f64(&self, section: &str, key: &str) -> Result<f64, ConfigError> {
        let raw = self.require(section, key)?;
        raw.parse().map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            expected: "number",
            value: raw.to_string(),
        })
    }

    pub fn get_u64_or(&self, section: &str, key: &str, default: u64) -> u64 {
        match self.get(section, key) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(section, key, value = raw, "not a valid integer, using {default}");
                default
            }),
        }
    }

    pub fn get_f64_or(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.get(section, key) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(section, key, value = raw, "not a valid number, using {default}");
                default
            }),
        }
    }

    /// Flag `enabled` de la section : défaut true si la section existe.
    pub fn enabled(&self, section: &str) -> bool {
        if !self.has_section(section) {
            return false;
        }
        !matches!(self.get(section, "enabled"), Some("false") | Some("no") | Some("0"))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
