//! Execution planner - groups resources into ordered stages

use crate::resource::{BoxedResource, Resource, ResourceExt};

/// A named group of resources applied together, in declaration order
pub struct Stage {
    pub name: String,
    pub resources: Vec<BoxedResource>,
}

/// An execution plan: stages in a fixed order, resources in spec order
pub struct ExecutionPlan {
    stages: Vec<Stage>,
}

impl ExecutionPlan {
    /// Create a plan whose stages run in `order`
    ///
    /// Resources of a section not listed in `order` get a stage appended
    /// after the known ones.
    pub fn with_stage_order(order: &[&str]) -> Self {
        Self {
            stages: order
                .iter()
                .map(|name| Stage {
                    name: (*name).to_string(),
                    resources: Vec::new(),
                })
                .collect(),
        }
    }

    /// Create a new empty plan
    pub fn new() -> Self {
        Self::with_stage_order(&[])
    }

    /// Add a resource to the stage of its section
    pub fn add_resource(&mut self, resource: BoxedResource) {
        let section = resource.section();
        match self.stages.iter_mut().find(|s| s.name == section) {
            Some(stage) => stage.resources.push(resource),
            None => self.stages.push(Stage {
                name: section.to_string(),
                resources: vec![resource],
            }),
        }
    }

    /// Stages that hold at least one resource, in order
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().filter(|s| !s.resources.is_empty())
    }

    /// All resources, in execution order
    pub fn resources(&self) -> impl Iterator<Item = &BoxedResource> {
        self.stages().flat_map(|s| s.resources.iter())
    }

    /// Filter plan to only include resources matching a predicate
    #[must_use]
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Resource) -> bool,
    {
        Self {
            stages: self
                .stages
                .into_iter()
                .map(|stage| Stage {
                    name: stage.name,
                    resources: stage
                        .resources
                        .into_iter()
                        .filter(|r| predicate(r.as_ref()))
                        .collect(),
                })
                .collect(),
        }
    }

    /// Keep only resources matching any of the targets
    ///
    /// Target format: "section", "section.kind" or "section.kind.name"
    #[must_use]
    pub fn filter_by_targets(self, targets: &[String]) -> Self {
        if targets.is_empty() {
            return self;
        }
        let parsed: Vec<Target> = targets.iter().map(|t| parse_target(t)).collect();
        self.filter(|r| parsed.iter().any(|t| matches_filter(r, t)))
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.stages.iter().map(|s| s.resources.len()).sum()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.total_resources() == 0
    }
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Target {
    section: String,
    kind: Option<String>,
    name: Option<String>,
}

fn parse_target(target: &str) -> Target {
    let mut parts = target.splitn(3, '.');
    Target {
        section: parts.next().unwrap_or_default().to_string(),
        kind: parts.next().map(str::to_string),
        name: parts.next().map(str::to_string),
    }
}

fn matches_filter(resource: &dyn Resource, target: &Target) -> bool {
    if resource.section() != target.section {
        return false;
    }
    if let Some(kind) = &target.kind
        && resource.resource_type() != format!("{}.{kind}", target.section)
    {
        return false;
    }
    if let Some(name) = &target.name
        && resource.id() != *name
    {
        return false;
    }
    true
}
