use crate::config::{FeatureGates, ResourceSpec};
use nodefit_core::resources::names::{CPU, MEMORY};
use nodefit_core::workload::ResizeStatus;
use nodefit_core::{ContainerSpec, ResourceVector, Workload};

/// CPU assumed for a container that requests none, when scoring
pub const DEFAULT_MILLI_CPU_REQUEST: i64 = 100;
/// Memory assumed for a container that requests none, when scoring
pub const DEFAULT_MEMORY_REQUEST: i64 = 200 * 1024 * 1024;

/// How container requests are folded into a pod request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Account for resources allocated by in-place resizes
    pub in_place_scaling: bool,
    /// Substitute default cpu/memory for containers that leave them unset
    pub non_zero_defaults: bool,
    pub exclude_overhead: bool,
}

impl RequestOptions {
    pub fn from_features(features: &FeatureGates) -> Self {
        Self {
            in_place_scaling: features.in_place_pod_vertical_scaling,
            ..Default::default()
        }
    }

    pub fn with_non_zero_defaults(mut self) -> Self {
        self.non_zero_defaults = true;
        self
    }
}

/// Fill in default cpu/memory where the container leaves them out. An
/// explicit zero request is kept.
fn apply_non_zero_defaults(
    container: &ContainerSpec,
    mut requests: ResourceVector,
) -> ResourceVector {
    if requests.milli_cpu == 0 && !container.specifies(CPU) {
        requests.milli_cpu = DEFAULT_MILLI_CPU_REQUEST;
    }
    if requests.memory == 0 && !container.specifies(MEMORY) {
        requests.memory = DEFAULT_MEMORY_REQUEST;
    }
    requests
}

/// Effective request of the pod: the regular containers and running sidecars
/// together, or the largest init step if that is bigger, plus overhead.
pub fn pod_requests(workload: &Workload, opts: RequestOptions) -> ResourceVector {
    let normalize = |container: &ContainerSpec, requests: ResourceVector| {
        if opts.non_zero_defaults {
            apply_non_zero_defaults(container, requests)
        } else {
            requests
        }
    };

    let mut reqs = ResourceVector::default();
    for container in &workload.containers {
        let mut requests = container.requests.clone();
        if opts.in_place_scaling {
            if let Some(allocated) = workload.allocated.get(&container.name) {
                if workload.resize == Some(ResizeStatus::Infeasible) {
                    requests = allocated.clone();
                } else {
                    requests.set_max(allocated);
                }
            }
        }
        reqs.add(&normalize(container, requests));
    }

    let mut sidecars = ResourceVector::default();
    let mut init_max = ResourceVector::default();
    for container in &workload.init_containers {
        let requests = normalize(container, container.requests.clone());
        if container.restartable {
            reqs.add(&requests);
            sidecars.add(&requests);
            init_max.set_max(&sidecars);
        } else {
            init_max.set_max(&requests.sum(&sidecars));
        }
    }
    reqs.set_max(&init_max);

    if !opts.exclude_overhead {
        if let Some(overhead) = &workload.overhead {
            reqs.add(overhead);
        }
    }

    reqs
}

/// Request used by the filter stage
pub fn compute_pod_resource_request(workload: &Workload, features: &FeatureGates) -> ResourceVector {
    pod_requests(workload, RequestOptions::from_features(features))
}

/// Requested quantity of each scoring resource, in the given order, with
/// default cpu/memory substituted for containers that request none
pub fn resource_request_list(
    workload: &Workload,
    resources: &[ResourceSpec],
    features: &FeatureGates,
) -> Vec<i64> {
    let requests = pod_requests(
        workload,
        RequestOptions::from_features(features).with_non_zero_defaults(),
    );
    resources.iter().map(|r| requests.get(&r.name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodefit_core::ContainerSpec;

    const MI: i64 = 1024 * 1024;

    fn cpu(milli: i64) -> ResourceVector {
        ResourceVector::new().with_milli_cpu(milli)
    }

    #[test]
    fn test_regular_containers_are_summed() {
        let workload = Workload::new("default", "web")
            .with_container(ContainerSpec::new("a", cpu(200).with_memory(64 * MI)))
            .with_container(ContainerSpec::new("b", cpu(300).with_scalar("example.com/gpu", 1)));

        let reqs = pod_requests(&workload, RequestOptions::default());
        assert_eq!(reqs.milli_cpu, 500);
        assert_eq!(reqs.memory, 64 * MI);
        assert_eq!(reqs.get("example.com/gpu"), 1);
    }

    #[test]
    fn test_single_container_plus_overhead() {
        let workload = Workload::new("default", "web")
            .with_container(ContainerSpec::new("app", cpu(250).with_memory(128 * MI)))
            .with_overhead(cpu(50).with_memory(16 * MI));

        let reqs = pod_requests(&workload, RequestOptions::default());
        assert_eq!(reqs.milli_cpu, 300);
        assert_eq!(reqs.memory, 144 * MI);

        let opts = RequestOptions {
            exclude_overhead: true,
            ..Default::default()
        };
        assert_eq!(pod_requests(&workload, opts).milli_cpu, 250);
    }

    #[test]
    fn test_init_containers_take_the_max() {
        let workload = Workload::new("default", "web")
            .with_init_container(ContainerSpec::new("init-1", cpu(2000)))
            .with_init_container(ContainerSpec::new("init-2", cpu(500).with_memory(512 * MI)))
            .with_container(ContainerSpec::new("a", cpu(300).with_memory(100 * MI)))
            .with_container(ContainerSpec::new("b", cpu(300).with_memory(100 * MI)))
            .with_overhead(cpu(10));

        let reqs = pod_requests(&workload, RequestOptions::default());
        assert_eq!(reqs.milli_cpu, 2010);
        assert_eq!(reqs.memory, 512 * MI);
    }

    #[test]
    fn test_restartable_init_containers() {
        // sidecar 100m runs alongside everything after it
        let workload = Workload::new("default", "web")
            .with_init_container(ContainerSpec::new("sidecar", cpu(100)).restartable())
            .with_init_container(ContainerSpec::new("migrate", cpu(1000)))
            .with_container(ContainerSpec::new("app", cpu(500)));

        let reqs = pod_requests(&workload, RequestOptions::default());
        // max(500 + 100, 1000 + 100)
        assert_eq!(reqs.milli_cpu, 1100);

        let workload = Workload::new("default", "web")
            .with_init_container(ContainerSpec::new("migrate", cpu(300)))
            .with_init_container(ContainerSpec::new("sidecar", cpu(200)).restartable())
            .with_container(ContainerSpec::new("app", cpu(500)));
        // max(500 + 200, 300, 200)
        assert_eq!(pod_requests(&workload, RequestOptions::default()).milli_cpu, 700);
    }

    #[test]
    fn test_non_zero_defaults() {
        let workload = Workload::new("default", "web")
            .with_container(ContainerSpec::new("a", ResourceVector::new()))
            .with_container(ContainerSpec::new("b", cpu(250)));

        let plain = pod_requests(&workload, RequestOptions::default());
        assert_eq!(plain.milli_cpu, 250);
        assert_eq!(plain.memory, 0);

        let non_zero = pod_requests(&workload, RequestOptions::default().with_non_zero_defaults());
        assert_eq!(non_zero.milli_cpu, 350);
        assert_eq!(non_zero.memory, 2 * DEFAULT_MEMORY_REQUEST);
    }

    #[test]
    fn test_explicit_zero_request_is_not_defaulted() {
        let workload = Workload::new("default", "web")
            .with_container(ContainerSpec::new("a", ResourceVector::new()).with_explicit_zero("cpu"))
            .with_container(ContainerSpec::new("b", ResourceVector::new()));

        let non_zero = pod_requests(&workload, RequestOptions::default().with_non_zero_defaults());
        // only "b" leaves cpu out
        assert_eq!(non_zero.milli_cpu, DEFAULT_MILLI_CPU_REQUEST);
        assert_eq!(non_zero.memory, 2 * DEFAULT_MEMORY_REQUEST);
    }

    #[test]
    fn test_in_place_scaling_uses_allocated() {
        let mut workload = Workload::new("default", "web")
            .with_container(ContainerSpec::new("app", cpu(500).with_memory(100 * MI)));
        workload
            .allocated
            .insert("app".to_string(), cpu(1000).with_memory(50 * MI));

        let features = FeatureGates {
            in_place_pod_vertical_scaling: true,
            ..Default::default()
        };
        let reqs = compute_pod_resource_request(&workload, &features);
        assert_eq!(reqs.milli_cpu, 1000);
        assert_eq!(reqs.memory, 100 * MI);

        workload.resize = Some(ResizeStatus::Infeasible);
        let reqs = compute_pod_resource_request(&workload, &features);
        assert_eq!(reqs.milli_cpu, 1000);
        assert_eq!(reqs.memory, 50 * MI);

        let reqs = compute_pod_resource_request(&workload, &FeatureGates::default());
        assert_eq!(reqs.milli_cpu, 500);
    }

    #[test]
    fn test_resource_request_list_order() {
        let workload = Workload::new("default", "web").with_container(ContainerSpec::new(
            "app",
            ResourceVector::new().with_scalar("example.com/gpu", 2),
        ));
        let resources = vec![
            ResourceSpec::new("example.com/gpu", 1),
            ResourceSpec::new("memory", 1),
            ResourceSpec::new("cpu", 1),
            ResourceSpec::new("ephemeral-storage", 1),
        ];

        let list = resource_request_list(&workload, &resources, &FeatureGates::default());
        assert_eq!(
            list,
            vec![2, DEFAULT_MEMORY_REQUEST, DEFAULT_MILLI_CPU_REQUEST, 0]
        );
    }
}
