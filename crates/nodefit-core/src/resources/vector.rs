use crate::resources::names::{is_scalar_resource_name, CPU, EPHEMERAL_STORAGE, MEMORY};
use crate::resources::quantities::parse_resource;
use crate::Result;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A k8s resource list: resource name to quantity
pub type ResourceList = BTreeMap<String, Quantity>;

/// Resource quantities needed by a workload or committed on a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVector {
    /// CPU in millicores (1000 = 1 core)
    pub milli_cpu: i64,
    /// Memory in bytes
    pub memory: i64,
    /// Ephemeral storage in bytes
    pub ephemeral_storage: i64,
    /// Extended, huge page and other scalar resources by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scalar: BTreeMap<String, i64>,
}

impl ResourceVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_milli_cpu(mut self, milli_cpu: i64) -> Self {
        self.milli_cpu = milli_cpu;
        self
    }

    pub fn with_memory(mut self, memory: i64) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_ephemeral_storage(mut self, ephemeral_storage: i64) -> Self {
        self.ephemeral_storage = ephemeral_storage;
        self
    }

    pub fn with_scalar(mut self, name: impl Into<String>, quantity: i64) -> Self {
        self.scalar.insert(name.into(), quantity);
        self
    }

    /// Build a vector from a k8s resource list. Names that are neither one of
    /// the fixed dimensions nor a scalar resource (such as "pods") are skipped.
    pub fn from_resource_list(list: &ResourceList) -> Result<Self> {
        let mut vector = Self::default();
        for (name, quantity) in list {
            let value = parse_resource(name, quantity)?;
            vector.set(name, value);
        }
        Ok(vector)
    }

    /// Quantity of a named resource (0 when absent)
    pub fn get(&self, name: &str) -> i64 {
        match name {
            CPU => self.milli_cpu,
            MEMORY => self.memory,
            EPHEMERAL_STORAGE => self.ephemeral_storage,
            _ => self.scalar.get(name).copied().unwrap_or(0),
        }
    }

    /// Set a named resource. Returns false if the name is not tracked.
    pub fn set(&mut self, name: &str, value: i64) -> bool {
        match name {
            CPU => self.milli_cpu = value,
            MEMORY => self.memory = value,
            EPHEMERAL_STORAGE => self.ephemeral_storage = value,
            _ if is_scalar_resource_name(name) => {
                self.scalar.insert(name.to_string(), value);
            }
            _ => return false,
        }
        true
    }

    /// Add another vector dimension-wise
    pub fn add(&mut self, other: &ResourceVector) {
        self.milli_cpu += other.milli_cpu;
        self.memory += other.memory;
        self.ephemeral_storage += other.ephemeral_storage;
        for (name, quantity) in &other.scalar {
            *self.scalar.entry(name.clone()).or_insert(0) += quantity;
        }
    }

    /// Raise each dimension to at least the other vector's value
    pub fn set_max(&mut self, other: &ResourceVector) {
        self.milli_cpu = self.milli_cpu.max(other.milli_cpu);
        self.memory = self.memory.max(other.memory);
        self.ephemeral_storage = self.ephemeral_storage.max(other.ephemeral_storage);
        for (name, quantity) in &other.scalar {
            let entry = self.scalar.entry(name.clone()).or_insert(0);
            *entry = (*entry).max(*quantity);
        }
    }

    /// Dimension-wise sum, leaving both inputs untouched
    pub fn sum(&self, other: &ResourceVector) -> ResourceVector {
        let mut result = self.clone();
        result.add(other);
        result
    }

    pub fn is_zero(&self) -> bool {
        self.milli_cpu == 0
            && self.memory == 0
            && self.ephemeral_storage == 0
            && self.scalar.values().all(|q| *q == 0)
    }

    /// Names of all non-zero dimensions, fixed dimensions first
    pub fn requested_names(&self) -> impl Iterator<Item = &str> + '_ {
        let fixed = [
            (CPU, self.milli_cpu),
            (MEMORY, self.memory),
            (EPHEMERAL_STORAGE, self.ephemeral_storage),
        ];
        fixed
            .into_iter()
            .filter(|(_, q)| *q != 0)
            .map(|(name, _)| name)
            .chain(
                self.scalar
                    .iter()
                    .filter(|(_, q)| **q != 0)
                    .map(|(name, _)| name.as_str()),
            )
    }
}
