use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::algebra::RatFunc;
use crate::analysis::DomainSolution;
use crate::component::{Component, ComponentKind, SourceValue};
use crate::context::AnalysisContext;
use crate::domain::Domain;
use crate::error::{CircuitError, Result};
use crate::solver::SolverConfig;
use crate::symbol::SymbolId;

/// Name of the ground node.
pub const GROUND: &str = "0";

/// Represents a node in the circuit
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub id: usize,
}

impl Node {
    pub fn new(name: String, id: usize) -> Self {
        Node { name, id }
    }

    pub fn is_ground(&self) -> bool {
        is_ground_name(&self.name)
    }
}

pub(crate) fn is_ground_name(name: &str) -> bool {
    name == GROUND || name.eq_ignore_ascii_case("gnd") || name.eq_ignore_ascii_case("ground")
}

/// Equivalence classes of nodes joined by wires.
#[derive(Debug, Clone)]
pub struct NodeClasses {
    parent: Vec<usize>,
}

impl NodeClasses {
    fn new(size: usize) -> Self {
        NodeClasses {
            parent: (0..size).collect(),
        }
    }

    pub fn find(&self, mut id: usize) -> usize {
        while self.parent[id] != id {
            id = self.parent[id];
        }
        id
    }

    /// Joins two classes; the lower id (ground is 0) becomes the representative.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[merge] = keep;
        }
    }

    pub fn is_ground(&self, id: usize) -> bool {
        self.find(id) == 0
    }
}

/// Netlist plus its symbol context and result cache.
///
/// Every structural change (adding, removing or replacing a component) clears the
/// cache; value changes go through [`Circuit::substitute`], which returns a new circuit.
#[derive(Debug)]
pub struct Circuit {
    pub title: String,
    ctx: AnalysisContext,
    nodes: Vec<Node>,
    node_map: HashMap<String, usize>,
    components: Vec<Component>,
    component_map: HashMap<String, usize>,
    parallel: bool,
    solver_config: SolverConfig,
    cache: Mutex<HashMap<Domain, Arc<DomainSolution>>>,
}

impl Clone for Circuit {
    fn clone(&self) -> Self {
        Circuit {
            title: self.title.clone(),
            ctx: self.ctx.clone(),
            nodes: self.nodes.clone(),
            node_map: self.node_map.clone(),
            components: self.components.clone(),
            component_map: self.component_map.clone(),
            parallel: self.parallel,
            solver_config: self.solver_config.clone(),
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for Circuit {
    fn default() -> Self {
        Circuit::new(String::new())
    }
}

impl Circuit {
    pub fn new(title: String) -> Self {
        Circuit::with_context(title, AnalysisContext::new())
    }

    /// Starts from an existing context so that symbols keep their identities.
    pub fn with_context(title: String, ctx: AnalysisContext) -> Self {
        let mut circuit = Circuit {
            title,
            ctx,
            nodes: Vec::new(),
            node_map: HashMap::new(),
            components: Vec::new(),
            component_map: HashMap::new(),
            parallel: true,
            solver_config: SolverConfig::default(),
            cache: Mutex::new(HashMap::new()),
        };
        circuit.add_node(GROUND);
        circuit
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut AnalysisContext {
        &mut self.ctx
    }

    /// Positive real symbol of this circuit's context.
    pub fn symbol(&mut self, name: &str) -> RatFunc {
        RatFunc::var(self.ctx.symbol(name))
    }

    /// Solve independent domains on the rayon pool.
    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Pivoting used by later solves; clears the cache.
    pub fn set_solver_config(&mut self, config: SolverConfig) {
        self.solver_config = config;
        self.invalidate();
    }

    pub fn solver_config(&self) -> &SolverConfig {
        &self.solver_config
    }

    /// Add a node to the circuit and return its ID
    pub fn add_node(&mut self, name: &str) -> usize {
        let name = if is_ground_name(name) { GROUND } else { name };
        if let Some(&existing_id) = self.node_map.get(name) {
            return existing_id;
        }
        let node_id = self.nodes.len();
        self.nodes.push(Node::new(name.to_string(), node_id));
        self.node_map.insert(name.to_string(), node_id);
        node_id
    }

    /// Add a component to the circuit
    pub fn add(&mut self, component: Component) -> Result<()> {
        component.validate()?;
        if self.component_map.contains_key(&component.name) {
            return Err(CircuitError::DuplicateComponent(component.name));
        }
        for node_name in &component.nodes {
            self.add_node(node_name);
        }
        debug!("Adding {} {}", component.kind.description(), component.name);
        self.component_map.insert(component.name.clone(), self.components.len());
        self.components.push(component);
        self.invalidate();
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Component> {
        let index = self
            .component_map
            .remove(name)
            .ok_or_else(|| CircuitError::UnknownComponent(name.to_string()))?;
        let removed = self.components.remove(index);
        self.reindex();
        self.invalidate();
        Ok(removed)
    }

    /// Replaces the component of the same name.
    pub fn replace(&mut self, component: Component) -> Result<()> {
        component.validate()?;
        let index = *self
            .component_map
            .get(&component.name)
            .ok_or_else(|| CircuitError::UnknownComponent(component.name.clone()))?;
        for node_name in &component.nodes {
            self.add_node(node_name);
        }
        self.components[index] = component;
        self.invalidate();
        Ok(())
    }

    fn reindex(&mut self) {
        self.component_map = self
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
    }

    pub(crate) fn invalidate(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if !cache.is_empty() {
            debug!("Clearing {} cached domain solutions", cache.len());
        }
        cache.clear();
    }

    pub(crate) fn cached(&self, domain: &Domain) -> Option<Arc<DomainSolution>> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(domain).cloned()
    }

    pub(crate) fn store(&self, solution: Arc<DomainSolution>) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(solution.domain.clone(), solution);
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Result<&Component> {
        self.component_map
            .get(name)
            .map(|&i| &self.components[i])
            .ok_or_else(|| CircuitError::UnknownComponent(name.to_string()))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get node ID by name
    pub fn node_id(&self, name: &str) -> Result<usize> {
        let name = if is_ground_name(name) { GROUND } else { name };
        self.node_map
            .get(name)
            .copied()
            .ok_or_else(|| CircuitError::UnknownNode(name.to_string()))
    }

    pub fn node_name(&self, id: usize) -> &str {
        self.nodes.get(id).map(|n| n.name.as_str()).unwrap_or(GROUND)
    }

    /// Node classes after merging wires.
    pub fn node_classes(&self) -> NodeClasses {
        let mut classes = NodeClasses::new(self.nodes.len());
        for component in &self.components {
            if component.kind == ComponentKind::Wire {
                if let (Some(&a), Some(&b)) = (self.node_map.get(&component.nodes[0]), self.node_map.get(&component.nodes[1])) {
                    classes.union(a, b);
                }
            }
        }
        classes
    }

    /// Names of the representative non-ground nodes, in creation order.
    pub fn principal_nodes(&self) -> Vec<String> {
        let classes = self.node_classes();
        self.nodes
            .iter()
            .filter(|n| classes.find(n.id) == n.id && !classes.is_ground(n.id))
            .map(|n| n.name.clone())
            .collect()
    }

    pub fn independent_sources(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.is_independent_source())
    }

    pub fn has_initial_conditions(&self) -> bool {
        self.components.iter().any(|c| c.initial_condition().is_some())
    }

    /// Every domain that some independent source drives.
    pub fn domains(&self) -> Vec<Domain> {
        let mut domains: Vec<Domain> = self
            .independent_sources()
            .filter_map(|c| c.source_value())
            .flat_map(|v| v.domains())
            .collect();
        domains.sort();
        domains.dedup();
        domains
    }

    /// Structural checks: every node reaches ground, and no two voltage sources
    /// across the same node pair disagree.
    pub fn validate(&self) -> Result<()> {
        let classes = self.node_classes();
        let mut reach = NodeClasses::new(self.nodes.len());
        for component in &self.components {
            let ids = component
                .nodes
                .iter()
                .map(|n| self.node_id(n))
                .collect::<Result<Vec<_>>>()?;
            match component.kind {
                ComponentKind::Open | ComponentKind::Port => {}
                _ => {
                    reach.union(ids[0], ids[1]);
                    if ids.len() == 4 {
                        reach.union(ids[2], ids[3]);
                    }
                }
            }
        }
        for node in &self.nodes {
            if !reach.is_ground(node.id) {
                return Err(CircuitError::FloatingNode { node: node.name.clone() });
            }
        }

        let mut by_pair: HashMap<(usize, usize), (&str, SourceValue)> = HashMap::new();
        for component in &self.components {
            if let ComponentKind::VoltageSource(value) = &component.kind {
                let a = classes.find(self.node_id(&component.nodes[0])?);
                let b = classes.find(self.node_id(&component.nodes[1])?);
                let (key, value) = if a <= b {
                    ((a, b), value.clone())
                } else {
                    ((b, a), value.negated())
                };
                if let Some((first, existing)) = by_pair.get(&key) {
                    if !same_value(existing, &value) {
                        return Err(CircuitError::VoltageSourceConflict {
                            first: first.to_string(),
                            second: component.name.clone(),
                        });
                    }
                } else {
                    by_pair.insert(key, (component.name.as_str(), value));
                }
            }
        }
        Ok(())
    }

    /// New circuit built from this one's components mapped through `f`, sharing the
    /// symbol context.
    pub fn map_components(&self, f: impl Fn(&Component) -> Component) -> Circuit {
        let mut circuit = self.clone();
        circuit.components = self.components.iter().map(f).collect();
        circuit
    }

    /// Every independent source set to zero.
    pub fn killed(&self) -> Circuit {
        self.map_components(Component::killed)
    }

    /// Copy with `name` replaced by `value` in every component.
    pub fn substitute(&self, name: &str, value: &RatFunc) -> Circuit {
        match self.ctx.registry.lookup(name) {
            Some(id) => self.substitute_id(id, value),
            None => self.clone(),
        }
    }

    pub fn substitute_id(&self, id: SymbolId, value: &RatFunc) -> Circuit {
        info!("Substituting {} in '{}'", self.ctx.registry.name(id), self.title);
        self.map_components(|c| c.substitute(id, value))
    }

    /// Print circuit summary
    pub fn print_summary(&self) {
        println!("Circuit: {}", self.title);
        println!("Nodes: {}", self.nodes.len());
        println!("Components: {}", self.components.len());

        let mut type_counts: HashMap<&str, usize> = HashMap::new();
        for component in &self.components {
            *type_counts.entry(component.kind.description()).or_insert(0) += 1;
        }
        let mut counts: Vec<_> = type_counts.into_iter().collect();
        counts.sort();
        for (type_name, count) in counts {
            println!("  {}: {}", type_name, count);
        }
    }
}

fn same_value(a: &SourceValue, b: &SourceValue) -> bool {
    a.parts().len() == b.parts().len() && a.parts().iter().all(|p| b.parts().contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Signal;

    fn rc_circuit() -> Circuit {
        let mut circuit = Circuit::new("rc".to_string());
        let r = circuit.symbol("R");
        let c = circuit.symbol("C");
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(RatFunc::from_int(5))).unwrap())
            .unwrap();
        circuit.add(Component::resistor("R1", "1", "2", r).unwrap()).unwrap();
        circuit.add(Component::capacitor("C1", "2", "0", c, None).unwrap()).unwrap();
        circuit
    }

    #[test]
    fn test_node_creation() {
        let node = Node::new("gnd".to_string(), 0);
        assert!(node.is_ground());
        let mut circuit = Circuit::new("t".to_string());
        assert_eq!(circuit.add_node("ground"), 0);
        assert_eq!(circuit.add_node("a"), 1);
        assert_eq!(circuit.add_node("a"), 1);
    }

    #[test]
    fn test_circuit_building() {
        let circuit = rc_circuit();
        assert_eq!(circuit.components().len(), 3);
        assert_eq!(circuit.principal_nodes(), vec!["1".to_string(), "2".to_string()]);
        assert!(circuit.validate().is_ok());
        assert_eq!(circuit.domains(), vec![Domain::Dc]);
    }

    #[test]
    fn test_duplicate_component() {
        let mut circuit = rc_circuit();
        let again = Component::resistor("R1", "1", "0", RatFunc::one()).unwrap();
        assert_eq!(circuit.add(again), Err(CircuitError::DuplicateComponent("R1".to_string())));
    }

    #[test]
    fn test_floating_node() {
        let mut circuit = rc_circuit();
        circuit.add(Component::resistor("R2", "3", "4", RatFunc::one()).unwrap()).unwrap();
        assert!(matches!(circuit.validate(), Err(CircuitError::FloatingNode { .. })));
    }

    #[test]
    fn test_wires_merge_nodes() {
        let mut circuit = rc_circuit();
        circuit.add(Component::wire("W1", "2", "3").unwrap()).unwrap();
        circuit.add(Component::resistor("R2", "3", "0", RatFunc::one()).unwrap()).unwrap();
        let classes = circuit.node_classes();
        assert_eq!(
            classes.find(circuit.node_id("3").unwrap()),
            circuit.node_id("2").unwrap()
        );
        assert_eq!(circuit.principal_nodes().len(), 2);
    }

    #[test]
    fn test_parallel_voltage_sources() {
        let mut circuit = rc_circuit();
        let same = Component::voltage_source("V2", "0", "1", SourceValue::dc(RatFunc::from_int(-5))).unwrap();
        circuit.add(same).unwrap();
        assert!(circuit.validate().is_ok());
        let other = Component::voltage_source("V3", "1", "0", SourceValue::dc(RatFunc::from_int(3))).unwrap();
        circuit.add(other).unwrap();
        assert!(matches!(circuit.validate(), Err(CircuitError::VoltageSourceConflict { .. })));
    }

    #[test]
    fn test_substitute_and_kill() {
        let circuit = rc_circuit();
        let numeric = circuit.substitute("R", &RatFunc::from_int(10));
        match &numeric.component("R1").unwrap().kind {
            ComponentKind::Resistor(v) => assert_eq!(v, &RatFunc::from_int(10)),
            other => panic!("unexpected {:?}", other),
        }
        let killed = circuit.killed();
        assert!(killed.domains().is_empty());
        assert_eq!(circuit.domains().len(), 1);
    }

    #[test]
    fn test_remove_and_replace() {
        let mut circuit = rc_circuit();
        let removed = circuit.remove("R1").unwrap();
        assert_eq!(removed.name, "R1");
        assert!(circuit.component("R1").is_err());
        assert!(circuit.component("C1").is_ok());
        let v = Component::voltage_source(
            "V1",
            "1",
            "0",
            SourceValue::new(vec![Signal::Dc(RatFunc::from_int(1))]),
        )
        .unwrap();
        circuit.replace(v).unwrap();
        assert!(circuit.replace(Component::wire("W9", "1", "2").unwrap()).is_err());
    }
}
