//! Whole-menu cost report.
//!
//! Each root is resolved independently: a cycle under one menu item shows up as a
//! failed entry while every other item still gets its breakdown.

use serde::Serialize;

use larder_core::{EngineError, MaterialId};

use crate::graph::{CostBreakdown, MaterialGraph};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReportEntry {
    pub material_id: MaterialId,
    pub name: String,
    #[serde(serialize_with = "serialize_outcome")]
    pub outcome: Result<CostBreakdown, EngineError>,
}

fn serialize_outcome<S>(
    outcome: &Result<CostBreakdown, EngineError>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    #[derive(Serialize)]
    #[serde(tag = "status", rename_all = "lowercase")]
    enum Outcome<'a> {
        Ok { breakdown: &'a CostBreakdown },
        Error { message: String },
    }

    match outcome {
        Ok(breakdown) => Outcome::Ok { breakdown }.serialize(serializer),
        Err(e) => Outcome::Error {
            message: e.to_string(),
        }
        .serialize(serializer),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostReport {
    pub entries: Vec<CostReportEntry>,
}

impl CostReport {
    /// Resolve every id in `roots` with the same overhead.
    pub fn build<'a, I>(graph: &MaterialGraph, roots: I, overhead_fraction: f64) -> Self
    where
        I: IntoIterator<Item = &'a MaterialId>,
    {
        let entries = roots
            .into_iter()
            .map(|root| {
                let name = graph.get(root).map(|m| m.name.clone()).unwrap_or_default();
                let outcome = graph.resolve_cost(root, overhead_fraction);
                if let Err(e) = &outcome {
                    tracing::warn!(material = %root, error = %e, "cost report entry failed");
                }
                CostReportEntry {
                    material_id: root.clone(),
                    name,
                    outcome,
                }
            })
            .collect();
        Self { entries }
    }

    /// Report over every composite that no other composite uses (the sellable items).
    pub fn top_level(graph: &MaterialGraph, overhead_fraction: f64) -> Self {
        let mut roots: Vec<&MaterialId> = graph
            .materials()
            .filter(|m| m.is_composite && graph.where_used(&m.id).is_empty())
            .map(|m| &m.id)
            .collect();
        roots.sort();
        Self::build(graph, roots, overhead_fraction)
    }

    pub fn successes(&self) -> impl Iterator<Item = &CostBreakdown> {
        self.entries.iter().filter_map(|e| e.outcome.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&MaterialId, &EngineError)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().err().map(|err| (&e.material_id, err)))
    }

    /// Sum of `total_cost` over successful entries.
    pub fn total_cost(&self) -> f64 {
        self.successes().map(|b| b.total_cost).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{BomLine, Material};

    fn id(s: &str) -> MaterialId {
        MaterialId::new(s).unwrap()
    }

    fn menu() -> MaterialGraph {
        MaterialGraph::from_snapshot(
            vec![
                Material::composite(id("toast"), "Toast"),
                Material::composite(id("loop_a"), "Loop A"),
                Material::composite(id("loop_b"), "Loop B"),
                Material::composite(id("broken"), "Broken dish"),
                Material::ingredient(id("bread"), "Bread").with_price(2.0, 1.0),
            ],
            vec![
                BomLine::new(id("toast"), id("bread"), 2.0, 0),
                BomLine::new(id("broken"), id("loop_a"), 1.0, 0),
                BomLine::new(id("loop_a"), id("loop_b"), 1.0, 0),
                BomLine::new(id("loop_b"), id("loop_a"), 1.0, 0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn one_cycle_does_not_abort_the_report() {
        let graph = menu();
        let roots = [id("toast"), id("broken")];
        let report = CostReport::build(&graph, roots.iter(), 0.1);

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.successes().count(), 1);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, &id("broken"));
        assert!(matches!(failures[0].1, EngineError::CircularReference(_)));
        assert!((report.total_cost() - 4.4).abs() < 1e-9);
    }

    #[test]
    fn top_level_skips_sub_recipes() {
        let report = CostReport::top_level(&menu(), 0.0);
        let ids: Vec<_> = report.entries.iter().map(|e| e.material_id.as_str()).collect();
        assert_eq!(ids, vec!["broken", "toast"]);
    }

    #[test]
    fn report_serializes_errors_as_messages() {
        let graph = menu();
        let roots = [id("broken")];
        let report = CostReport::build(&graph, roots.iter(), 0.0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][0]["outcome"]["status"], "error");
    }
}
