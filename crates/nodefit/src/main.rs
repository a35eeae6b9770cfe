use clap::{Args, Parser, Subcommand, ValueEnum};
use nodefit_core::{ClusterEvent, Node, NodeState, Pod, ResourceEvent, Workload};
use nodefit_scheduler::{FeatureGates, Fit, FitArgs, ScheduleResult, Scheduler, Snapshot};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "nodefit", about = "Node resource fit checks for pod scheduling")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "NODEFIT_LOG_FORMAT", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
struct PluginArgs {
    /// Path to the fit plugin arguments (YAML)
    #[arg(long, env = "NODEFIT_CONFIG")]
    config: Option<PathBuf>,
    /// Account for resources allocated by in-place pod resizes
    #[arg(long, env = "NODEFIT_IN_PLACE_POD_VERTICAL_SCALING")]
    in_place_pod_vertical_scaling: bool,
    /// Reject pods that declare restartable init containers
    #[arg(long, env = "NODEFIT_DISABLE_SIDECAR_CONTAINERS")]
    disable_sidecar_containers: bool,
}

impl PluginArgs {
    fn features(&self) -> FeatureGates {
        FeatureGates {
            in_place_pod_vertical_scaling: self.in_place_pod_vertical_scaling,
            sidecar_containers: !self.disable_sidecar_containers,
        }
    }

    fn fit_args(&self) -> miette::Result<FitArgs> {
        match &self.config {
            Some(path) => Ok(FitArgs::from_file(path)?),
            None => Ok(FitArgs::default()),
        }
    }

    fn plugin(&self) -> miette::Result<Fit> {
        Ok(Fit::new(&self.fit_args()?, self.features())?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a pod against a set of nodes and pick the best one
    Check {
        /// Pod manifest (YAML)
        #[arg(long)]
        pod: PathBuf,
        /// Node manifests (multi-document YAML)
        #[arg(long)]
        nodes: PathBuf,
        /// Pods already bound to the nodes (multi-document YAML)
        #[arg(long)]
        assigned: Option<PathBuf>,
        #[command(flatten)]
        plugin: PluginArgs,
    },
    /// Validate fit plugin arguments
    ValidateConfig {
        /// Path to the fit plugin arguments (YAML)
        #[arg(long, env = "NODEFIT_CONFIG")]
        config: PathBuf,
    },
    /// Park a pod and replay watch events to see which ones requeue it
    Replay {
        /// Pod manifest (YAML)
        #[arg(long)]
        pod: PathBuf,
        /// Watch events, one JSON object per line
        #[arg(long)]
        events: PathBuf,
        #[command(flatten)]
        plugin: PluginArgs,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    match cli.command {
        Commands::Check {
            pod,
            nodes,
            assigned,
            plugin,
        } => {
            let report = run_check(&pod, &nodes, assigned.as_deref(), &plugin)?;
            print!("{}", report);
            match report.selected {
                Some(_) => Ok(()),
                None => Err(miette::miette!("No node can host {}", report.workload)),
            }
        }
        Commands::ValidateConfig { config } => {
            let args = FitArgs::from_file(&config)?;
            println!(
                "{} is valid ({:?} over {} resources)",
                config.display(),
                args.scoring_strategy.kind,
                args.scoring_strategy.resources.len()
            );
            Ok(())
        }
        Commands::Replay {
            pod,
            events,
            plugin,
        } => run_replay(&pod, &events, &plugin).await,
    }
}

fn read_file(path: &Path) -> miette::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read '{}': {}", path.display(), e))
}

fn load_workload(path: &Path) -> miette::Result<Workload> {
    let pod: Pod = nodefit_core::from_yaml(&read_file(path)?)?;
    Ok(Workload::try_from(&pod)?)
}

fn load_nodes(path: &Path) -> miette::Result<Vec<NodeState>> {
    let nodes: Vec<Node> = nodefit_core::from_yaml_documents(&read_file(path)?)?;
    nodes
        .iter()
        .map(|node| NodeState::try_from(node).map_err(miette::Report::from))
        .collect()
}

fn load_assigned(path: &Path) -> miette::Result<Vec<Workload>> {
    let pods: Vec<Pod> = nodefit_core::from_yaml_documents(&read_file(path)?)?;
    pods.iter()
        .map(|pod| Workload::try_from(pod).map_err(miette::Report::from))
        .collect()
}

/// Verdict for one node
struct NodeReport {
    name: String,
    reasons: Vec<String>,
    score: Option<i64>,
}

/// Outcome of the check command
struct CheckReport {
    workload: String,
    nodes: Vec<NodeReport>,
    selected: Option<ScheduleResult>,
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pod {}", self.workload)?;
        for node in &self.nodes {
            match node.score {
                Some(score) => writeln!(f, "  {}: fits (score {})", node.name, score)?,
                None => writeln!(f, "  {}: {}", node.name, node.reasons.join(", "))?,
            }
        }
        match &self.selected {
            Some(selected) => writeln!(f, "Selected node: {}", selected.node_name),
            None => writeln!(f, "No suitable node"),
        }
    }
}

fn run_check(
    pod: &Path,
    nodes: &Path,
    assigned: Option<&Path>,
    plugin: &PluginArgs,
) -> miette::Result<CheckReport> {
    let features = plugin.features();
    let fit = plugin.plugin()?;
    let workload = load_workload(pod)?;
    let bound = match assigned {
        Some(path) => load_assigned(path)?,
        None => Vec::new(),
    };
    let snapshot = Snapshot::new(load_nodes(nodes)?, &bound, &features);

    info!(
        "Checking {} against {} nodes ({} bound workloads)",
        workload,
        snapshot.len(),
        bound.len()
    );

    let scheduler = Scheduler::new(fit);
    let evaluation = scheduler.evaluate(&workload, &snapshot)?;
    let nodes = evaluation
        .filtered
        .iter()
        .map(|result| NodeReport {
            name: result.node_name.clone(),
            reasons: result.status.reasons().to_vec(),
            score: evaluation.score_of(&result.node_name),
        })
        .collect();

    let selected = match evaluation.outcome {
        Ok(result) => Some(result),
        Err(nodefit_scheduler::SchedulerError::NoSuitableNodes { reason, .. }) => {
            warn!("{}", reason);
            None
        }
        Err(e) => return Err(e.into()),
    };

    Ok(CheckReport {
        workload: workload.to_string(),
        nodes,
        selected,
    })
}

/// Parse a JSON-lines file of watch events, skipping those that do not type
fn load_events(path: &Path) -> miette::Result<Vec<ClusterEvent>> {
    let data = read_file(path)?;
    let mut events = Vec::new();
    for (i, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let raw: ResourceEvent = nodefit_core::from_json(line)?;
        match ClusterEvent::from_watch(&raw) {
            Ok(event) => events.push(event),
            Err(e) => warn!("Skipping event on line {}: {}", i + 1, e),
        }
    }
    Ok(events)
}

async fn run_replay(pod: &Path, events: &Path, plugin: &PluginArgs) -> miette::Result<()> {
    let scheduler = Arc::new(Scheduler::new(plugin.plugin()?));
    let workload = load_workload(pod)?;
    let events = load_events(events)?;
    info!("Replaying {} events for parked workload {}", events.len(), workload);
    scheduler.park(workload.clone());

    let (event_tx, event_rx) = broadcast::channel(events.len().max(1));
    let (requeue_tx, mut requeue_rx) = mpsc::channel(16);
    let token = CancellationToken::new();

    let controller_token = token.clone();
    let controller = scheduler.clone();
    let handle = tokio::spawn(async move {
        controller.run(event_rx, requeue_tx, controller_token).await
    });

    for event in events {
        if event_tx.send(event).is_err() {
            break;
        }
    }
    drop(event_tx);

    let mut requeued = false;
    loop {
        tokio::select! {
            received = requeue_rx.recv() => match received {
                Some(w) => {
                    println!("Requeued {}", w);
                    requeued = true;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                token.cancel();
                break;
            }
        }
    }

    handle
        .await
        .map_err(|e| miette::miette!("Requeue controller task failed: {}", e))??;

    if !requeued {
        println!("{} stays parked", workload);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const POD: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: web
  namespace: default
  uid: uid-web
spec:
  containers:
    - name: app
      resources:
        requests:
          cpu: 1500m
          memory: 1Gi
"#;

    const NODES: &str = r#"
apiVersion: v1
kind: Node
metadata:
  name: busy
status:
  allocatable:
    cpu: "4"
    memory: 8Gi
    pods: "110"
---
apiVersion: v1
kind: Node
metadata:
  name: idle
status:
  allocatable:
    cpu: "2"
    memory: 4Gi
    pods: "110"
"#;

    const ASSIGNED: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: db
  namespace: default
spec:
  nodeName: busy
  containers:
    - name: db
      resources:
        requests:
          cpu: "3"
          memory: 2Gi
"#;

    fn file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn plugin_args(config: Option<PathBuf>) -> PluginArgs {
        PluginArgs {
            config,
            in_place_pod_vertical_scaling: false,
            disable_sidecar_containers: false,
        }
    }

    #[test]
    fn test_check_reports_each_node() {
        let pod = file(POD);
        let nodes = file(NODES);
        let assigned = file(ASSIGNED);

        let report = run_check(
            pod.path(),
            nodes.path(),
            Some(assigned.path()),
            &plugin_args(None),
        )
        .unwrap();

        assert_eq!(report.workload, "default/web");
        assert_eq!(report.nodes.len(), 2);
        assert_eq!(report.nodes[0].name, "busy");
        assert_eq!(report.nodes[0].reasons, vec!["Insufficient cpu".to_string()]);
        assert!(report.nodes[1].score.is_some());
        assert_eq!(report.selected.as_ref().unwrap().node_name, "idle");

        let rendered = report.to_string();
        assert!(rendered.contains("busy: Insufficient cpu"));
        assert!(rendered.contains("Selected node: idle"));
    }

    #[test]
    fn test_check_without_room() {
        let pod = file(POD);
        let nodes = file(NODES);
        let assigned = file(&format!("{}---{}", ASSIGNED, ASSIGNED.replace("busy", "idle").replace("\"3\"", "\"1\"")));

        let report = run_check(
            pod.path(),
            nodes.path(),
            Some(assigned.path()),
            &plugin_args(None),
        )
        .unwrap();
        assert!(report.selected.is_none());
        assert!(report.to_string().contains("No suitable node"));
    }

    #[test]
    fn test_plugin_args_from_config() {
        let config = file("scoringStrategy:\n  type: MostAllocated\n");
        let args = plugin_args(Some(config.path().to_path_buf()));
        assert!(args.plugin().is_ok());
        assert!(args.features().sidecar_containers);

        let bad = file("scoringStrategy:\n  type: Balanced\n");
        assert!(plugin_args(Some(bad.path().to_path_buf())).plugin().is_err());
    }

    #[test]
    fn test_load_events_skips_untyped() {
        let events = file(concat!(
            r#"{"event_type":"ADDED","kind":"Node","object":{"metadata":{"name":"n1"}}}"#,
            "\n\n",
            r#"{"event_type":"ADDED","kind":"Service","object":{}}"#,
            "\n",
        ));
        let events = load_events(events.path()).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ClusterEvent::NodeAdded { .. }));
    }

    #[tokio::test]
    async fn test_replay_runs_to_completion() {
        let pod = file(POD);
        let events = file(concat!(
            r#"{"event_type":"ADDED","kind":"Node","object":{"metadata":{"name":"n1"},"status":{"allocatable":{"cpu":"4","memory":"8Gi","pods":"10"}}}}"#,
            "\n",
        ));
        run_replay(pod.path(), events.path(), &plugin_args(None))
            .await
            .unwrap();
    }
}
