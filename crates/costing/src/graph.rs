//! Material graph and recipe cost rollup.
//!
//! The graph is an arena of materials keyed by id with adjacency stored as BOM lines
//! per parent. Resolution is a depth-first walk from the root that tracks the
//! current path; revisiting a material on that path is a cycle and aborts the whole
//! resolution. The same component may appear in unrelated branches.
//!
//! ```text
//! Latte (composite, overhead applied here only)
//!  ├─ 18 g   Espresso base (composite, resolved with overhead 0)
//!  │    └─ ... leaves priced by real_unit_cost
//!  └─ 200 ml Milk (leaf)
//! ```
//!
//! The walk uses an explicit work stack rather than recursion, so deep chains of
//! sub-recipes cannot exhaust the call stack.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use larder_core::{CyclePath, EngineConfig, EngineError, EngineResult, MaterialId, ValueObject};

use crate::cost::real_unit_cost;
use crate::material::{BomLine, Material};

/// One resolved line of a cost breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub component_id: MaterialId,
    /// Cost of one consumption unit of the component.
    pub unit_cost: f64,
    pub quantity: f64,
    pub line_cost: f64,
}

/// Result of resolving a material's cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub material_id: MaterialId,
    /// Ordered by BOM position.
    pub lines: Vec<CostLine>,
    pub subtotal: f64,
    pub overhead_fraction: f64,
    pub overhead_amount: f64,
    pub total_cost: f64,
}

impl CostBreakdown {
    fn from_lines(material_id: MaterialId, lines: Vec<CostLine>, overhead_fraction: f64) -> Self {
        let subtotal = lines.iter().map(|l| l.line_cost).sum::<f64>();
        let overhead_amount = subtotal * overhead_fraction;
        Self {
            material_id,
            lines,
            subtotal,
            overhead_fraction,
            overhead_amount,
            total_cost: subtotal + overhead_amount,
        }
    }

    /// `false` for a composite whose recipe has not been defined yet.
    pub fn has_recipe(&self) -> bool {
        !self.lines.is_empty()
    }
}

impl ValueObject for CostBreakdown {}

/// In-memory arena of materials with BOM adjacency.
#[derive(Debug, Clone, Default)]
pub struct MaterialGraph {
    materials: HashMap<MaterialId, Material>,
    lines: HashMap<MaterialId, Vec<BomLine>>,
}

/// One level of the resolution walk.
struct Frame<'g> {
    id: &'g MaterialId,
    lines: &'g [BomLine],
    next: usize,
    resolved: Vec<CostLine>,
}

impl<'g> Frame<'g> {
    fn new(id: &'g MaterialId, lines: &'g [BomLine]) -> Self {
        Self {
            id,
            lines,
            next: 0,
            resolved: Vec::with_capacity(lines.len()),
        }
    }

    fn push_line(&mut self, line: &BomLine, unit_cost: f64) {
        self.resolved.push(CostLine {
            component_id: line.component_id.clone(),
            unit_cost,
            quantity: line.quantity,
            line_cost: unit_cost * line.quantity,
        });
        self.next += 1;
    }
}

impl MaterialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from host-supplied snapshots.
    ///
    /// Duplicate material ids and malformed lines are rejected with `InvalidReference`.
    /// Cycles are accepted here and reported by [`resolve_cost`](Self::resolve_cost).
    pub fn from_snapshot<M, L>(materials: M, bom_lines: L) -> EngineResult<Self>
    where
        M: IntoIterator<Item = Material>,
        L: IntoIterator<Item = BomLine>,
    {
        let mut graph = Self::new();
        for material in materials {
            if graph.materials.contains_key(&material.id) {
                return Err(EngineError::invalid(format!(
                    "duplicate material '{}'",
                    material.id
                )));
            }
            graph.materials.insert(material.id.clone(), material);
        }
        for line in bom_lines {
            graph.add_line(line)?;
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn get(&self, id: &MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.materials.values()
    }

    /// BOM lines of `parent`, in position order.
    pub fn lines_of(&self, parent: &MaterialId) -> &[BomLine] {
        self.lines.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Insert or replace a material.
    ///
    /// Turning a composite that still has BOM lines into a leaf is rejected.
    pub fn upsert_material(&mut self, material: Material) -> EngineResult<()> {
        if !material.is_composite && !self.lines_of(&material.id).is_empty() {
            return Err(EngineError::invalid(format!(
                "material '{}' still has BOM lines and cannot become a leaf",
                material.id
            )));
        }
        self.materials.insert(material.id.clone(), material);
        Ok(())
    }

    /// Add a BOM line. Parent must be an existing composite, component must exist.
    pub fn add_line(&mut self, line: BomLine) -> EngineResult<()> {
        let parent = self
            .materials
            .get(&line.parent_id)
            .ok_or_else(|| EngineError::missing_material(&line.parent_id))?;
        if !parent.is_composite {
            return Err(EngineError::invalid(format!(
                "material '{}' is not composite and cannot have BOM lines",
                line.parent_id
            )));
        }
        if !self.materials.contains_key(&line.component_id) {
            return Err(EngineError::missing_material(&line.component_id));
        }
        if !line.quantity.is_finite() || line.quantity < 0.0 {
            return Err(EngineError::invalid(format!(
                "BOM line {} -> {} has invalid quantity {}",
                line.parent_id, line.component_id, line.quantity
            )));
        }

        let lines = self.lines.entry(line.parent_id.clone()).or_default();
        let at = lines.partition_point(|l| l.position <= line.position);
        lines.insert(at, line);
        Ok(())
    }

    /// Remove every line of `parent` that points at `component`. Returns how many went.
    pub fn remove_line(&mut self, parent: &MaterialId, component: &MaterialId) -> usize {
        let Some(lines) = self.lines.get_mut(parent) else {
            return 0;
        };
        let before = lines.len();
        lines.retain(|l| &l.component_id != component);
        let removed = before - lines.len();
        if lines.is_empty() {
            self.lines.remove(parent);
        }
        removed
    }

    /// Composites that list `component` directly, sorted by id.
    pub fn where_used(&self, component: &MaterialId) -> Vec<&MaterialId> {
        let mut parents: Vec<&MaterialId> = self
            .lines
            .iter()
            .filter(|(_, lines)| lines.iter().any(|l| &l.component_id == component))
            .map(|(parent, _)| parent)
            .collect();
        parents.sort();
        parents
    }

    /// Delete a material and its own BOM lines.
    ///
    /// Rejected while any other composite still uses it; the host decides whether to
    /// cascade by removing those lines first.
    pub fn remove_material(&mut self, id: &MaterialId) -> EngineResult<Material> {
        let users = self.where_used(id);
        if !users.is_empty() {
            let users = users
                .iter()
                .map(|u| u.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(EngineError::invalid(format!(
                "material '{id}' is used by: {users}"
            )));
        }
        let material = self
            .materials
            .remove(id)
            .ok_or_else(|| EngineError::missing_material(id))?;
        self.lines.remove(id);
        Ok(material)
    }

    /// Cost of one consumption unit of any material (composites resolved without overhead).
    pub fn unit_cost_of(&self, id: &MaterialId) -> EngineResult<f64> {
        let material = self
            .materials
            .get(id)
            .ok_or_else(|| EngineError::missing_material(id))?;
        if material.is_composite {
            Ok(self.resolve_cost(id, 0.0)?.total_cost)
        } else {
            Ok(real_unit_cost(material))
        }
    }

    /// [`resolve_cost`](Self::resolve_cost) with the configured default overhead.
    pub fn resolve_cost_default(
        &self,
        root: &MaterialId,
        config: &EngineConfig,
    ) -> EngineResult<CostBreakdown> {
        self.resolve_cost(root, config.default_overhead_fraction)
    }

    /// Resolve the full cost of `root`, applying `overhead_fraction` once at the top.
    ///
    /// - Leaves contribute `real_unit_cost * quantity`.
    /// - Composites contribute their own total (overhead 0) times quantity.
    /// - A composite with no lines resolves to 0 with an empty breakdown.
    /// - A leaf root resolves to a single line for one consumption unit of itself.
    ///
    /// Fails with `CircularReference` (no partial result) if the walk re-enters a
    /// material on the current path. Pure: the same graph gives bit-identical results.
    pub fn resolve_cost(
        &self,
        root: &MaterialId,
        overhead_fraction: f64,
    ) -> EngineResult<CostBreakdown> {
        if !overhead_fraction.is_finite() || overhead_fraction < 0.0 {
            return Err(EngineError::invalid(format!(
                "overhead fraction must be a non-negative number, got {overhead_fraction}"
            )));
        }
        let (root_id, root_material) = self
            .materials
            .get_key_value(root)
            .ok_or_else(|| EngineError::missing_material(root))?;

        if !root_material.is_composite {
            let unit_cost = real_unit_cost(root_material);
            let line = CostLine {
                component_id: root_id.clone(),
                unit_cost,
                quantity: 1.0,
                line_cost: unit_cost,
            };
            return Ok(CostBreakdown::from_lines(
                root_id.clone(),
                vec![line],
                overhead_fraction,
            ));
        }

        // Subtotals of composites already resolved in this call. A fully resolved
        // subgraph is acyclic, so reusing it from another branch cannot hide a cycle.
        let mut resolved: HashMap<&MaterialId, f64> = HashMap::new();
        let mut on_path: HashSet<&MaterialId> = HashSet::new();
        let mut stack: Vec<Frame<'_>> = vec![Frame::new(root_id, self.lines_of(root_id))];
        on_path.insert(root_id);

        while let Some(frame) = stack.last_mut() {
            let lines = frame.lines;
            if let Some(line) = lines.get(frame.next) {
                let (component_id, component) = self
                    .materials
                    .get_key_value(&line.component_id)
                    .ok_or_else(|| EngineError::missing_material(&line.component_id))?;

                if !component.is_composite {
                    frame.push_line(line, real_unit_cost(component));
                    continue;
                }
                if let Some(subtotal) = resolved.get(component_id) {
                    frame.push_line(line, *subtotal);
                    continue;
                }
                if on_path.contains(component_id) {
                    let start = stack
                        .iter()
                        .position(|f| f.id == component_id)
                        .unwrap_or(0);
                    let path = stack[start..].iter().map(|f| f.id.clone()).collect();
                    let path = CyclePath::new(path);
                    tracing::debug!(root = %root_id, cycle = %path, "cost resolution hit a cycle");
                    return Err(EngineError::CircularReference(path));
                }

                on_path.insert(component_id);
                stack.push(Frame::new(component_id, self.lines_of(component_id)));
                continue;
            }

            // Frame exhausted: its parent's current line picks the subtotal up next turn.
            let Some(done) = stack.pop() else { break };
            on_path.remove(done.id);
            if stack.is_empty() {
                let breakdown =
                    CostBreakdown::from_lines(done.id.clone(), done.resolved, overhead_fraction);
                tracing::debug!(
                    root = %root_id,
                    subtotal = breakdown.subtotal,
                    total = breakdown.total_cost,
                    "resolved material cost"
                );
                return Ok(breakdown);
            }
            let subtotal = done.resolved.iter().map(|l| l.line_cost).sum::<f64>();
            resolved.insert(done.id, subtotal);
        }

        Err(EngineError::invalid(format!(
            "cost resolution of '{root_id}' ended without a result"
        )))
    }
}

/// Resolve `root_id` against plain snapshots, building a throwaway graph.
pub fn resolve_cost(
    root_id: &MaterialId,
    overhead_fraction: f64,
    materials: &[Material],
    bom_lines: &[BomLine],
) -> EngineResult<CostBreakdown> {
    let graph = MaterialGraph::from_snapshot(materials.iter().cloned(), bom_lines.iter().cloned())?;
    graph.resolve_cost(root_id, overhead_fraction)
}
