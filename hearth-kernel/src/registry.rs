/**
 * HEARTH REGISTRY - Résolution de l'ordre de construction des unités
 *
 * RÔLE : Tri topologique par passes répétées sur les déclarations d'unités.
 * Passe 1 : les unités sans prérequis, dans l'ordre de déclaration. Passes
 * suivantes : toute unité dont tous les prérequis sont déjà placés. Une
 * passe qui ne place rien alors qu'il reste des unités signe un cycle.
 *
 * Nom de prérequis inconnu ou cycle : erreur fatale, le superviseur refuse
 * de démarrer plutôt que de construire un sous-ensemble incohérent.
 */

use crate::plugins::PluginDescriptor;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("unit `{unit}` depends on unknown unit `{depends_on}`")]
    Unknown { unit: String, depends_on: String },
    #[error("unit `{0}` is declared twice")]
    Duplicate(String),
    #[error("dependency cycle, unresolved units: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Rend les indices de déclaration dans l'ordre de construction.
pub fn resolve(descriptors: &[PluginDescriptor]) -> Result<Vec<usize>, DependencyError> {
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    for (i, d) in descriptors.iter().enumerate() {
        if index_of.insert(d.name, i).is_some() {
            return Err(DependencyError::Duplicate(d.name.to_string()));
        }
    }
    for d in descriptors {
        for dep in d.depends_on {
            if !index_of.contains_key(dep) {
                return Err(DependencyError::Unknown {
                    unit: d.name.to_string(),
                    depends_on: dep.to_string(),
                });
            }
        }
    }

    let mut placed = vec![false; descriptors.len()];
    let mut order = Vec::with_capacity(descriptors.len());

    while order.len() < descriptors.len() {
        let mut appended = false;
        for (i, d) in descriptors.iter().enumerate() {
            if placed[i] {
                continue;
            }
            if d.depends_on.iter().all(|dep| placed[index_of[dep]]) {
                placed[i] = true;
                order.push(i);
                appended = true;
            }
        }
        if !appended {
            let unresolved = descriptors
                .iter()
                .enumerate()
                .filter(|(i, _)| !placed[*i])
                .map(|(_, d)| d.name.to_string())
                .collect();
            return Err(DependencyError::Cycle(unresolved));
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::tests::descriptor;

    fn names(descriptors: &[PluginDescriptor], order: &[usize]) -> Vec<&'static str> {
        order.iter().map(|&i| descriptors[i].name).collect()
    }

    #[test]
    fn independent_units_keep_declaration_order() {
        let d = vec![
            descriptor("c", &[]),
            descriptor("a", &[]),
            descriptor("b", &[]),
        ];
        let order = resolve(&d).unwrap();
        assert_eq!(names(&d, &order), ["c", "a", "b"]);
    }

    #[test]
    fn prerequisites_come_before_dependents() {
        let d = vec![
            descriptor("furnace", &["temperature", "setpoint"]),
            descriptor("setpoint", &["temperature"]),
            descriptor("temperature", &[]),
        ];
        let order = resolve(&d).unwrap();
        assert_eq!(names(&d, &order), ["temperature", "setpoint", "furnace"]);
    }

    #[test]
    fn later_pass_ties_break_by_declaration_order() {
        let d = vec![
            descriptor("base", &[]),
            descriptor("z", &["base"]),
            descriptor("a", &["base"]),
        ];
        let order = resolve(&d).unwrap();
        assert_eq!(names(&d, &order), ["base", "z", "a"]);
    }

    #[test]
    fn unknown_prerequisite_is_fatal() {
        let d = vec![descriptor("furnace", &["thermometer"])];
        assert_eq!(
            resolve(&d),
            Err(DependencyError::Unknown {
                unit: "furnace".to_string(),
                depends_on: "thermometer".to_string(),
            })
        );
    }

    #[test]
    fn cycle_reports_every_unresolved_unit() {
        let d = vec![
            descriptor("standalone", &[]),
            descriptor("ping", &["pong"]),
            descriptor("pong", &["ping"]),
        ];
        assert_eq!(
            resolve(&d),
            Err(DependencyError::Cycle(vec![
                "ping".to_string(),
                "pong".to_string()
            ]))
        );
    }

    #[test]
    fn duplicate_declaration_is_fatal() {
        let d = vec![descriptor("temperature", &[]), descriptor("temperature", &[])];
        assert_eq!(
            resolve(&d),
            Err(DependencyError::Duplicate("temperature".to_string()))
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let d = vec![descriptor("narcissus", &["narcissus"])];
        assert!(matches!(resolve(&d), Err(DependencyError::Cycle(_))));
    }
}
