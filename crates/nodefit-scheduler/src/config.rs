use crate::{Result, SchedulerError};
use nodefit_core::resources::names::{is_qualified_name, CPU, MEMORY};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Highest score a shape point may assign
pub const MAX_CUSTOM_PRIORITY_SCORE: i32 = 10;
/// Highest utilization percentage a shape point may name
pub const MAX_UTILIZATION: i32 = 100;
/// Highest weight a scored resource may carry
pub const MAX_RESOURCE_WEIGHT: i64 = 100;

/// Node scoring strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringStrategyType {
    LeastAllocated,
    MostAllocated,
    RequestedToCapacityRatio,
}

/// A resource taken into account when scoring, with its weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    pub weight: i64,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, weight: i64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// A control point of the utilization-to-score function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilizationShapePoint {
    /// Utilization percentage (0-100)
    pub utilization: i32,
    /// Score at that utilization (0-10)
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedToCapacityRatioParam {
    pub shape: Vec<UtilizationShapePoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringStrategyConfig {
    #[serde(rename = "type")]
    pub kind: ScoringStrategyType,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_to_capacity_ratio: Option<RequestedToCapacityRatioParam>,
}

fn default_resources() -> Vec<ResourceSpec> {
    vec![ResourceSpec::new(CPU, 1), ResourceSpec::new(MEMORY, 1)]
}

impl Default for ScoringStrategyConfig {
    fn default() -> Self {
        Self {
            kind: ScoringStrategyType::LeastAllocated,
            resources: default_resources(),
            requested_to_capacity_ratio: None,
        }
    }
}

/// Arguments of the resource fit plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitArgs {
    /// Extended resources the filter does not check
    #[serde(default)]
    pub ignored_resources: Vec<String>,
    /// Extended resource groups (prefix before '/') the filter does not check
    #[serde(default)]
    pub ignored_resource_groups: Vec<String>,
    #[serde(default)]
    pub scoring_strategy: ScoringStrategyConfig,
}

impl FitArgs {
    /// Parse, default and validate arguments from YAML
    pub fn from_yaml(data: &str) -> Result<Self> {
        let mut args: FitArgs = serde_yaml::from_str(data).map_err(|e| {
            SchedulerError::invalid_config(
                format!("Failed to parse fit arguments: {}", e),
                "Supported scoring strategies are LeastAllocated, MostAllocated and RequestedToCapacityRatio",
            )
        })?;
        args.apply_defaults();
        args.validate()?;
        Ok(args)
    }

    /// Load arguments from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::invalid_config(
                format!("Failed to read {}: {}", path.display(), e),
                "Check that the configuration file exists and is readable",
            )
        })?;
        Self::from_yaml(&data)
    }

    /// Fill in the scored resources when none are configured
    pub fn apply_defaults(&mut self) {
        if self.scoring_strategy.resources.is_empty() {
            self.scoring_strategy.resources = default_resources();
        }
    }

    /// Validate the arguments
    pub fn validate(&self) -> Result<()> {
        for (i, name) in self.ignored_resources.iter().enumerate() {
            if !is_qualified_name(name) {
                return Err(SchedulerError::invalid_config(
                    format!("ignoredResources[{}]: {} is not a qualified name", i, name),
                    "Use names like 'example.com/device'",
                ));
            }
        }

        for (i, group) in self.ignored_resource_groups.iter().enumerate() {
            if group.contains('/') {
                return Err(SchedulerError::invalid_config(
                    format!("ignoredResourceGroups[{}]: resource group name can't contain '/'", i),
                    "List only the group, e.g. 'example.com' for 'example.com/device'",
                ));
            }
            if !is_qualified_name(group) {
                return Err(SchedulerError::invalid_config(
                    format!("ignoredResourceGroups[{}]: {} is not a qualified name", i, group),
                    "Use a DNS subdomain such as 'example.com'",
                ));
            }
        }

        self.scoring_strategy.validate()
    }
}

impl ScoringStrategyConfig {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for resource in &self.resources {
            if resource.weight <= 0 || resource.weight > MAX_RESOURCE_WEIGHT {
                return Err(SchedulerError::invalid_config(
                    format!(
                        "resource weight of {} not in valid range [1, {}]",
                        resource.name, MAX_RESOURCE_WEIGHT
                    ),
                    "Give every scored resource a weight between 1 and 100",
                ));
            }
            if !seen.insert(resource.name.as_str()) {
                return Err(SchedulerError::invalid_config(
                    format!("duplicate resource {} in scoringStrategy.resources", resource.name),
                    "List each resource once",
                ));
            }
        }

        if self.kind == ScoringStrategyType::RequestedToCapacityRatio {
            let param = self.requested_to_capacity_ratio.as_ref().ok_or_else(|| {
                SchedulerError::invalid_config(
                    "requestedToCapacityRatio is required for the RequestedToCapacityRatio strategy",
                    "Add a requestedToCapacityRatio.shape list",
                )
            })?;
            validate_shape(&param.shape)?;
        }

        Ok(())
    }
}

fn validate_shape(shape: &[UtilizationShapePoint]) -> Result<()> {
    if shape.is_empty() {
        return Err(SchedulerError::invalid_config(
            "requestedToCapacityRatio.shape: at least one point must be specified",
            "Add points such as {utilization: 0, score: 10} and {utilization: 100, score: 0}",
        ));
    }

    for (i, point) in shape.iter().enumerate() {
        if point.utilization < 0 || point.utilization > MAX_UTILIZATION {
            return Err(SchedulerError::invalid_config(
                format!("shape[{}].utilization must be between 0 and {}", i, MAX_UTILIZATION),
                "Utilization is a percentage",
            ));
        }
        if point.score < 0 || point.score > MAX_CUSTOM_PRIORITY_SCORE {
            return Err(SchedulerError::invalid_config(
                format!("shape[{}].score must be between 0 and {}", i, MAX_CUSTOM_PRIORITY_SCORE),
                "Shape scores are scaled to the node score range internally",
            ));
        }
        if i > 0 && point.utilization <= shape[i - 1].utilization {
            return Err(SchedulerError::invalid_config(
                format!("shape[{}].utilization values must be sorted in increasing order", i),
                "Order points by strictly increasing utilization",
            ));
        }
    }

    Ok(())
}

/// Cluster-wide feature toggles the plugin honours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureGates {
    /// Pods may be resized in place, so an update can free resources
    pub in_place_pod_vertical_scaling: bool,
    /// Init containers may be restartable sidecars
    pub sidecar_containers: bool,
}

impl Default for FeatureGates {
    fn default() -> Self {
        Self {
            in_place_pod_vertical_scaling: false,
            sidecar_containers: true,
        }
    }
}
