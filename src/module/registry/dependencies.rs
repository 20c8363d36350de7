//! Module dependency resolution
//!
//! A module depends on every plugin that would contribute a group to its
//! isolation context. Start order puts providers first; plugins importing
//! from each other form a cycle group that starts together in peer order.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::module::registry::descriptor::ModuleDescriptor;
use crate::module::registry::ordering::peer_order;
use crate::module::resolver::ResolutionBuilder;
use crate::module::traits::ModuleId;

/// Dependency resolution result
#[derive(Debug, Clone, Default)]
pub struct DependencyResolution {
    /// Modules in start order (providers first, cycle members adjacent)
    pub load_order: Vec<ModuleId>,
    /// Groups of plugins that import from each other, each in start order
    pub cycles: Vec<Vec<ModuleId>>,
}

impl DependencyResolution {
    /// The cycle group containing `id`, if any
    pub fn cycle_of(&self, id: &ModuleId) -> Option<&[ModuleId]> {
        self.cycles
            .iter()
            .find(|group| group.contains(id))
            .map(Vec::as_slice)
    }
}

/// Dependency resolver
pub struct ModuleDependencies;

impl ModuleDependencies {
    /// Determine start order of `modules`
    ///
    /// Only edges between members of `modules` are considered; providers
    /// outside the set are checked at start time instead.
    pub fn resolve(modules: &[Arc<ModuleDescriptor>]) -> DependencyResolution {
        let providers: Vec<Vec<usize>> = modules
            .iter()
            .map(|module| {
                (0..modules.len())
                    .filter(|&p| ResolutionBuilder::grant(module, &modules[p]).is_some())
                    .collect()
            })
            .collect();

        let mut components = StronglyConnected::new(&providers).run();
        for component in &mut components {
            component.sort_by(|&a, &b| Self::start_order(&modules[a], &modules[b]));
        }
        let order = Self::topological_sort(modules, &providers, &components);

        let load_order: Vec<ModuleId> = order
            .iter()
            .flat_map(|&c| components[c].iter().map(|&m| modules[m].id().clone()))
            .collect();
        let cycles: Vec<Vec<ModuleId>> = order
            .iter()
            .filter(|&&c| components[c].len() > 1)
            .map(|&c| components[c].iter().map(|&m| modules[m].id().clone()).collect())
            .collect();

        if !cycles.is_empty() {
            info!("Import cycles start together in peer order: {:?}", cycles);
        }
        debug!("Dependency resolution complete: {:?}", load_order);

        DependencyResolution { load_order, cycles }
    }

    /// Kahn's algorithm over the condensed graph
    ///
    /// Among ready components, the one whose first member sorts earliest
    /// (plugins first, then peer order) goes next.
    fn topological_sort(
        modules: &[Arc<ModuleDescriptor>],
        providers: &[Vec<usize>],
        components: &[Vec<usize>],
    ) -> Vec<usize> {
        let mut component_of = vec![0; modules.len()];
        for (c, members) in components.iter().enumerate() {
            for &m in members {
                component_of[m] = c;
            }
        }

        // Edges between components; edges inside a cycle group are dropped
        let mut upstream: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
        for (m, list) in providers.iter().enumerate() {
            for &p in list {
                if component_of[p] != component_of[m] {
                    upstream[component_of[m]].insert(component_of[p]);
                }
            }
        }
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
        for (c, ups) in upstream.iter().enumerate() {
            for &u in ups {
                dependents[u].push(c);
            }
        }

        let mut in_degree: Vec<usize> = upstream.iter().map(BTreeSet::len).collect();
        let mut ready: Vec<usize> = (0..components.len()).filter(|&c| in_degree[c] == 0).collect();
        let mut result = Vec::with_capacity(components.len());

        while !ready.is_empty() {
            // plugins first, then peer order of each group's first member
            ready.sort_by(|&a, &b| {
                Self::start_order(&modules[components[a][0]], &modules[components[b][0]])
            });
            let next = ready.remove(0);
            result.push(next);

            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }
        result
    }

    fn start_order(a: &ModuleDescriptor, b: &ModuleDescriptor) -> Ordering {
        a.kind().cmp(&b.kind()).then_with(|| peer_order(a, b))
    }
}

/// Tarjan's strongly connected components over provider edges
struct StronglyConnected<'a> {
    edges: &'a [Vec<usize>],
    index: Vec<Option<usize>>,
    low_link: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    components: Vec<Vec<usize>>,
}

impl<'a> StronglyConnected<'a> {
    fn new(edges: &'a [Vec<usize>]) -> Self {
        let n = edges.len();
        Self {
            edges,
            index: vec![None; n],
            low_link: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next_index: 0,
            components: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<usize>> {
        for v in 0..self.edges.len() {
            if self.index[v].is_none() {
                self.visit(v);
            }
        }
        self.components
    }

    fn visit(&mut self, v: usize) {
        self.index[v] = Some(self.next_index);
        self.low_link[v] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let edges = self.edges;
        for &w in &edges[v] {
            match self.index[w] {
                None => {
                    self.visit(w);
                    self.low_link[v] = self.low_link[v].min(self.low_link[w]);
                }
                Some(w_index) if self.on_stack[w] => {
                    self.low_link[v] = self.low_link[v].min(w_index);
                }
                Some(_) => {}
            }
        }

        // v is the root of a component: pop it off
        if Some(self.low_link[v]) == self.index[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}
