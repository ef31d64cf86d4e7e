//! Step descriptors and the dependency graph built from them.
//!
//! Execution order is derived from declared dependencies, never hard-coded.
//! [`PipelineGraph::new`] validates the declarations and groups the steps into
//! levels: every step in a level depends only on steps in earlier levels, so
//! the steps within one level are mutually independent.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{Capability, PipelineError, ResourceName, StepName};

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// A named resource a step needs, and what it needs it for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub resource: ResourceName,
    pub capability: Capability,
}

impl ResourceRequirement {
    pub fn new(resource: ResourceName, capability: Capability) -> Self {
        Self {
            resource,
            capability,
        }
    }
}

/// Static declaration of one step: its name, the upstream steps whose outputs
/// it consumes, and the resources it must be given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub name: StepName,
    pub inputs: Vec<StepName>,
    pub resources: Vec<ResourceRequirement>,
}

impl StepDescriptor {
    /// A step with no inputs and no resources.
    pub fn new(name: StepName) -> Self {
        Self {
            name,
            inputs: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Declares a dependency on the output of `upstream`.
    pub fn with_input(mut self, upstream: StepName) -> Self {
        self.inputs.push(upstream);
        self
    }

    /// Declares a resource requirement.
    pub fn with_resource(mut self, resource: ResourceName, capability: Capability) -> Self {
        self.resources
            .push(ResourceRequirement::new(resource, capability));
        self
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A validated, acyclic step graph with a precomputed execution order.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    descriptors: Vec<StepDescriptor>,
    index: HashMap<StepName, usize>,
    levels: Vec<Vec<StepName>>,
}

impl PipelineGraph {
    /// Validates `descriptors` and computes execution levels.
    ///
    /// Uses Kahn's algorithm. Within a level, steps keep their declaration
    /// order, so the resulting order is deterministic.
    pub fn new(descriptors: Vec<StepDescriptor>) -> Result<Self, PipelineError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, descriptor) in descriptors.iter().enumerate() {
            if index.insert(descriptor.name.clone(), i).is_some() {
                return Err(PipelineError::DuplicateStep(descriptor.name.clone()));
            }
        }

        let mut remaining: Vec<usize> = vec![0; descriptors.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];
        for (i, descriptor) in descriptors.iter().enumerate() {
            let unique: HashSet<&StepName> = descriptor.inputs.iter().collect();
            for input in unique {
                let upstream = *index.get(input).ok_or_else(|| PipelineError::UnknownDependency {
                    step: descriptor.name.clone(),
                    dependency: input.clone(),
                })?;
                remaining[i] += 1;
                dependents[upstream].push(i);
            }
        }

        let mut levels = Vec::new();
        let mut ready: Vec<usize> = (0..descriptors.len())
            .filter(|&i| remaining[i] == 0)
            .collect();
        let mut placed = 0;
        while !ready.is_empty() {
            placed += ready.len();
            let mut next = Vec::new();
            for &i in &ready {
                for &dependent in &dependents[i] {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            levels.push(
                ready
                    .iter()
                    .map(|&i| descriptors[i].name.clone())
                    .collect(),
            );
            ready = next;
        }

        if placed != descriptors.len() {
            let cyclic = descriptors
                .iter()
                .enumerate()
                .filter(|(i, _)| remaining[*i] > 0)
                .map(|(_, d)| d.name.clone())
                .collect();
            return Err(PipelineError::CyclicGraph(cyclic));
        }

        Ok(Self {
            descriptors,
            index,
            levels,
        })
    }

    /// Steps grouped into execution levels.
    pub fn levels(&self) -> &[Vec<StepName>] {
        &self.levels
    }

    /// A flat topological order (levels concatenated).
    pub fn topological_order(&self) -> Vec<StepName> {
        self.levels.iter().flatten().cloned().collect()
    }

    /// Looks up a step's descriptor.
    pub fn descriptor(&self, name: &StepName) -> Option<&StepDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// All descriptors in declaration order.
    pub fn descriptors(&self) -> &[StepDescriptor] {
        &self.descriptors
    }

    /// Returns `true` if no step declares `name` as an input.
    pub fn is_terminal(&self, name: &StepName) -> bool {
        !self.descriptors.iter().any(|d| d.inputs.contains(name))
    }
}
