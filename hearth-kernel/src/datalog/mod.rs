/**
 * HEARTH DATALOG - Journal série temporelle à rotation quotidienne
 *
 * RÔLE : Primitive de stockage de toutes les unités : append-only, un fichier
 * CSV par jour (`<prefix>_<YYYY>_<MM>_<DD>.csv`), un lien `today.csv` recréé
 * à chaque rotation, et un buffer mémoire des lignes du jour pour le rendu.
 *
 * FONCTIONNEMENT : add_row vérifie sous mutex si le jour a changé ; si oui,
 * rotation (fermeture du fichier, lien refait, buffer rechargé depuis le
 * fichier du nouveau jour - vide pour un jour neuf, relu si le processus a
 * redémarré en cours de journée). Une ligne = timestamp Unix puis valeurs.
 * Une seule écriture par le thread propriétaire ; le mutex sérialise ce
 * writer contre les lecteurs du rendu.
 */

pub mod presence;
pub mod value;

use chrono::{DateTime, Datelike, Local, LocalResult, NaiveDate, TimeZone, Timelike};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum DataLogError {
    #[error("data log io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Une ligne bufferisée : timestamp Unix, timestamp d'affichage pré-rendu
/// (mois 0-11 côté JavaScript), valeurs propres à l'unité.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub ts: i64,
    pub js_time: String,
    pub values: Vec<String>,
}

struct LogInner {
    current_date: NaiveDate,
    file: Option<File>,
    rows: Vec<LogRow>,
}

pub struct DataLog {
    dir: PathBuf,
    prefix: String,
    pointer: PathBuf,
    inner: Mutex<LogInner>,
}

impl DataLog {
    /// Ouvre (ou reprend) le journal : crée le répertoire, pose le lien du
    /// jour et recharge le buffer si un fichier existe déjà pour aujourd'hui.
    pub fn open(dir: impl Into<PathBuf>, prefix: &str) -> Result<Self, DataLogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let log = Self {
            pointer: dir.join("today.csv"),
            dir,
            prefix: prefix.to_string(),
            inner: Mutex::new(LogInner {
                current_date: Local::now().date_naive(),
                file: None,
                rows: Vec::new(),
            }),
        };

        {
            let mut inner = log.inner.lock();
            let today = inner.current_date;
            log.rotate(&mut inner, today)?;
        }

        Ok(log)
    }

    pub fn add_row(&self, values: &[String]) {
        self.add_row_at(Local::now(), values);
    }

    fn add_row_at(&self, now: DateTime<Local>, values: &[String]) {
        let mut inner = self.inner.lock();

        // changement de jour -> rotation avant l'append
        if now.date_naive() != inner.current_date {
            if let Err(e) = self.rotate(&mut inner, now.date_naive()) {
                error!(log = %self.prefix, "rotation failed: {e}");
                return; // current_date inchangée, nouvel essai à la prochaine ligne
            }
        }

        let Some(file) = inner.file.as_mut() else {
            return;
        };

        let ts = now.timestamp();
        let mut line = ts.to_string();
        for value in values {
            line.push(',');
            line.push_str(value);
        }
        line.push('\n');

        if let Err(e) = file.write_all(line.as_bytes()) {
            error!(log = %self.prefix, "write failed: {e}");
            return;
        }

        inner.rows.push(LogRow {
            ts,
            js_time: js_time(ts),
            values: values.to_vec(),
        });
    }

    /// Lignes du jour uniquement ; les jours passés ne sont accessibles que
    /// via leur fichier d'archive.
    pub fn buffered_rows(&self) -> Vec<LogRow> {
        self.inner.lock().rows.clone()
    }

    pub fn pointer_path(&self) -> &Path {
        &self.pointer
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn archive_name(&self, date: NaiveDate) -> String {
        format!(
            "{}_{:04}_{:02}_{:02}.csv",
            self.prefix,
            date.year(),
            date.month(),
            date.day()
        )
    }

    /// Ferme le fichier courant, refait le lien `today.csv`, recharge le
    /// buffer depuis le fichier du nouveau jour.
    fn rotate(&self, inner: &mut LogInner, date: NaiveDate) -> Result<(), DataLogError> {
        inner.file = None;

        let archive = self.archive_name(date);
        let archive_path = self.dir.join(&archive);

        // touch du fichier du jour (sans effet s'il existe déjà)
        OpenOptions::new().append(true).create(true).open(&archive_path)?;

        // lien périmé supprimé puis recréé vers le fichier du jour
        if self
            .pointer
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
        {
            fs::remove_file(&self.pointer)?;
        }
        std::os::unix::fs::symlink(&archive, &self.pointer)?;

        // rechargement : non vide seulement si le processus redémarre le même jour
        inner.rows = load_rows(&archive_path, &self.prefix);
        inner.file = Some(OpenOptions::new().append(true).open(&self.pointer)?);
        inner.current_date = date;
        Ok(())
    }
}

fn load_rows(path: &Path, prefix: &str) -> Vec<LogRow> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for line in content.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',');
        let stamp = fields.next().unwrap_or_default();
        let Ok(ts) = stamp.parse::<f64>() else {
            warn!(log = prefix, "skipping unparsable row: {line}");
            continue;
        };
        let ts = ts as i64;
        rows.push(LogRow {
            ts,
            js_time: js_time(ts),
            values: fields.map(str::to_string).collect(),
        });
    }
    rows
}

/// `new Date(y,m,d,h,m,s)` - JavaScript attend le mois en 0-11.
fn js_time(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => format!(
            "new Date({},{},{},{},{},{})",
            dt.year(),
            dt.month0(),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        ),
        LocalResult::None => "new Date(0)".to_string(),
    }
}
