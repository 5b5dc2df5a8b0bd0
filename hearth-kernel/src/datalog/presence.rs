/**
 * HEARTH DATALOG/PRESENCE - Reconstruction d'intervalles de présence
 *
 * RÔLE : Transformer les lignes échantillonnées « item présent dans la ligne
 * N » en intervalles fermés [start,end] par item, et rendre la timeline
 * correspondante. Valeurs dérivées, jamais persistées : recalculées à chaque
 * rendu depuis le buffer du jour.
 */

use super::{DataLog, DataLogError, LogRow};
use std::collections::HashMap;
use std::path::PathBuf;

/// Intervalle continu de présence d'un item, bornes en secondes Unix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceInterval {
    pub item: String,
    pub start: i64,
    pub end: i64,
}

/// Balayage unique : par item, un début ouvert + un dernier-vu. L'absence
/// ferme l'intervalle au dernier-vu ; après la dernière ligne, tout début
/// encore ouvert est fermé de la même façon - aucun intervalle n'est perdu
/// en fin de données.
pub fn reconstruct_intervals(rows: &[LogRow], items: &[String]) -> Vec<PresenceInterval> {
    let mut open_start: HashMap<&str, i64> = HashMap::new();
    let mut last_seen: HashMap<&str, i64> = HashMap::new();
    let mut intervals = Vec::new();

    for row in rows {
        for item in items {
            let present = row.values.iter().any(|v| v == item);
            if present {
                open_start.entry(item).or_insert(row.ts);
                last_seen.insert(item, row.ts);
            } else if let Some(start) = open_start.remove(item.as_str()) {
                intervals.push(PresenceInterval {
                    item: item.clone(),
                    start,
                    end: last_seen[item.as_str()],
                });
            }
        }
    }

    for item in items {
        if let Some(start) = open_start.remove(item.as_str()) {
            intervals.push(PresenceInterval {
                item: item.clone(),
                start,
                end: last_seen[item.as_str()],
            });
        }
    }

    intervals
}

/// Journal de présence : chaque ligne liste les items présents à l'instant
/// de l'échantillon (ligne vide = aucun item, indispensable pour fermer les
/// intervalles).
pub struct PresenceLog {
    log: DataLog,
    items: Vec<String>,
}

impl PresenceLog {
    pub fn open(
        dir: impl Into<PathBuf>,
        prefix: &str,
        items: Vec<String>,
    ) -> Result<Self, DataLogError> {
        Ok(Self {
            log: DataLog::open(dir, prefix)?,
            items,
        })
    }

    pub fn record(&self, present: &[String]) {
        self.log.add_row(present);
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn intervals(&self) -> Vec<PresenceInterval> {
        reconstruct_intervals(&self.log.buffered_rows(), &self.items)
    }

    /// Lignes `['item', start, end],` pour google.visualization.Timeline,
    /// bornes rendues avec le timestamp d'affichage pré-calculé des lignes.
    pub fn timeline_data_rows(&self) -> String {
        let rows = self.log.buffered_rows();
        let js_by_ts: HashMap<i64, &str> =
            rows.iter().map(|r| (r.ts, r.js_time.as_str())).collect();

        let mut out = String::new();
        for interval in reconstruct_intervals(&rows, &self.items) {
            let (Some(start), Some(end)) =
                (js_by_ts.get(&interval.start), js_by_ts.get(&interval.end))
            else {
                continue;
            };
            out.push_str(&format!("['{}',  {}, {}],\n", interval.item, start, end));
        }
        // virgule et retour à la ligne de fin retirés
        if out.ends_with(",\n") {
            out.truncate(out.len() - 2);
        }
        out
    }

    /// Fragment complet : fonction de dessin + enregistrement dans
    /// ready_function_array, données inlinées.
    pub fn timeline_javascript(&self, chart_name: &str, item_label: &str, div_id: &str) -> String {
        format!(
            r#"
            function draw_{chart_name}_timeline() {{
                var dataTable = new google.visualization.DataTable();

                dataTable.addColumn({{ type: 'string', id: '{item_label}' }});
                dataTable.addColumn({{ type: 'date', id: 'Start' }});
                dataTable.addColumn({{ type: 'date', id: 'End' }});

                dataTable.addRows([

                {rows}

                ]);

                var chart = new google.visualization.Timeline(document.getElementById('{div_id}'));
                chart.draw(dataTable, {{ height: 340 }});
            }}
            ready_function_array.push( draw_{chart_name}_timeline )
            "#,
            chart_name = chart_name,
            item_label = item_label,
            div_id = div_id,
            rows = self.timeline_data_rows(),
        )
    }
}
