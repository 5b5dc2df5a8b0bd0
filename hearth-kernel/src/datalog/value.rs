/**
 * HEARTH DATALOG/VALUE - Séries numériques et rendu line chart
 *
 * RÔLE : Journal de valeurs numériques horodatées au-dessus de DataLog,
 * plus le fragment JavaScript qui va chercher le CSV du jour côté client
 * et le parse pour google.visualization.LineChart.
 */

use super::{DataLog, DataLogError};
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::warn;

pub struct ValueLog {
    log: DataLog,
    value_names: Vec<String>,
}

/// Première et dernière ligne exploitables d'un fichier archivé, pour les
/// récapitulatifs par jour (consommation = dernière - première).
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveDaySummary {
    pub date: NaiveDate,
    pub first: Vec<f64>,
    pub last: Vec<f64>,
}

impl ValueLog {
    pub fn open(
        dir: impl Into<PathBuf>,
        prefix: &str,
        value_names: Vec<String>,
    ) -> Result<Self, DataLogError> {
        Ok(Self {
            log: DataLog::open(dir, prefix)?,
            value_names,
        })
    }

    pub fn value_names(&self) -> &[String] {
        &self.value_names
    }

    pub fn record(&self, values: &[f64]) {
        let formatted: Vec<String> = values.iter().map(|v| format!("{v:.2}")).collect();
        self.log.add_row(&formatted);
    }

    /// Parcourt les `<prefix>_YYYY_MM_DD.csv` du répertoire et en extrait la
    /// première et la dernière ligne parsables. Fichiers vides ou aux noms
    /// inattendus ignorés, résultat trié par date.
    pub fn archive_summaries(&self) -> Vec<ArchiveDaySummary> {
        let mut summaries = Vec::new();

        let entries = match std::fs::read_dir(self.log.dir()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("lecture du répertoire d'archives impossible: {e}");
                return summaries;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(date) = self.archive_date(name) else {
                continue;
            };
            let Ok(contents) = std::fs::read_to_string(entry.path()) else {
                warn!("archive illisible: {name}");
                continue;
            };

            let mut first: Option<Vec<f64>> = None;
            let mut last: Option<Vec<f64>> = None;
            for line in contents.lines() {
                let Some(values) = parse_values(line) else {
                    continue;
                };
                if first.is_none() {
                    first = Some(values.clone());
                }
                last = Some(values);
            }

            if let (Some(first), Some(last)) = (first, last) {
                summaries.push(ArchiveDaySummary { date, first, last });
            }
        }

        summaries.sort_by_key(|s| s.date);
        summaries
    }

    fn archive_date(&self, file_name: &str) -> Option<NaiveDate> {
        let stem = file_name.strip_suffix(".csv")?;
        let rest = stem.strip_prefix(&format!("{}_", self.log.prefix()))?;
        let mut parts = rest.splitn(3, '_');
        let year: i32 = parts.next()?.parse().ok()?;
        let month: u32 = parts.next()?.parse().ok()?;
        let day: u32 = parts.next()?.parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    /// Fragment complet : parsing CSV côté client (timestamp Unix en
    /// première colonne, NaN rendu null pour trouer la courbe) puis $.get
    /// sur l'URL du jour et enregistrement dans ready_function_array.
    pub fn linechart_javascript(
        &self,
        chart_name: &str,
        title: &str,
        div_id: &str,
        data_url: &str,
        extra_options: &str,
    ) -> String {
        let mut columns = String::new();
        for name in &self.value_names {
            columns.push_str(&format!("data.addColumn('number', '{name}');\n            "));
        }
        let expected_fields = self.value_names.len() + 1;

        format!(
            r#"
        function drawChart_{chart_name}(file_contents)
        {{
            var rows = file_contents.split('\n');

            var data = new google.visualization.DataTable();
            data.addColumn('datetime', 'Time');
            {columns}
            for (var i = 0; i < rows.length; i++)
            {{
                var items = rows[i].split(',');

                if (items.length == {expected_fields})
                {{
                    var row_data = [];
                    row_data.push(new Date(parseFloat(items[0]) * 1000.0));

                    for (var j = 1; j < items.length; j++)
                    {{
                        var value = parseFloat(items[j]);
                        row_data.push(isNaN(value) ? null : value);
                    }}

                    data.addRow(row_data);
                }}
            }}

            var options = {{
                title: '{title}',
                legend: {{ position: 'bottom' }}{extra_options}
            }};

            var chart = new google.visualization.LineChart(document.getElementById('{div_id}'));
            chart.draw(data, options);
        }}

        function draw_{chart_name}()
        {{
            $.get('{data_url}', function(response_data, status)
            {{
                drawChart_{chart_name}(response_data);
            }});
        }}

        ready_function_array.push( draw_{chart_name} )
        "#,
            chart_name = chart_name,
            columns = columns,
            expected_fields = expected_fields,
            title = title,
            div_id = div_id,
            data_url = data_url,
            extra_options = extra_options,
        )
    }
}

/// `ts,v1,v2,...` vers les valeurs numériques, None si la ligne n'est pas
/// une ligne de données complète.
fn parse_values(line: &str) -> Option<Vec<f64>> {
    let mut fields = line.trim().split(',');
    fields.next()?.parse::<f64>().ok()?;
    let values: Vec<f64> = fields.map(|f| f.parse::<f64>()).collect::<Result<_, _>>().ok()?;
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn record_formats_two_decimals() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ValueLog::open(tmp.path(), "temps", vec!["Living Room".into()]).unwrap();

        log.record(&[70.456]);

        let contents = std::fs::read_to_string(tmp.path().join("today.csv")).unwrap();
        assert!(contents.trim_end().ends_with(",70.46"));
    }

    #[test]
    fn linechart_fragment_wires_fetch_and_registration() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ValueLog::open(
            tmp.path(),
            "temps",
            vec!["Living Room".into(), "Bedroom".into()],
        )
        .unwrap();

        let js = log.linechart_javascript(
            "temps",
            "Temperatures",
            "temps_chart_div",
            "/data/temps",
            ", vAxis: { viewWindow: { min: 50, max: 90 } }",
        );

        assert!(js.contains("data.addColumn('number', 'Living Room');"));
        assert!(js.contains("data.addColumn('number', 'Bedroom');"));
        assert!(js.contains("items.length == 3"));
        assert!(js.contains("$.get('/data/temps'"));
        assert!(js.contains("viewWindow"));
        assert!(js.contains("ready_function_array.push( draw_temps )"));
    }

    #[test]
    fn archive_summaries_read_first_and_last_rows_in_date_order() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ValueLog::open(tmp.path(), "energy", vec!["kwh".into()]).unwrap();

        let mut day_two =
            std::fs::File::create(tmp.path().join("energy_2021_03_11.csv")).unwrap();
        writeln!(day_two, "1615500000.00,20.50").unwrap();
        writeln!(day_two, "garbage line").unwrap();
        writeln!(day_two, "1615550000.00,24.75").unwrap();

        let mut day_one =
            std::fs::File::create(tmp.path().join("energy_2021_03_10.csv")).unwrap();
        writeln!(day_one, "1615400000.00,10.00").unwrap();

        std::fs::File::create(tmp.path().join("unrelated_2021_03_10.csv")).unwrap();

        let summaries = log.archive_summaries();
        // l'archive du jour est vide, seules les deux journées écrites comptent
        assert_eq!(summaries.len(), 2);
        assert_eq!(
            summaries[0].date,
            NaiveDate::from_ymd_opt(2021, 3, 10).unwrap()
        );
        assert_eq!(summaries[0].first, vec![10.00]);
        assert_eq!(summaries[0].last, vec![10.00]);
        assert_eq!(
            summaries[1].date,
            NaiveDate::from_ymd_opt(2021, 3, 11).unwrap()
        );
        assert_eq!(summaries[1].first, vec![20.50]);
        assert_eq!(summaries[1].last, vec![24.75]);
    }
}
