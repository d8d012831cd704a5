//! Ensemble - cluster provisioning orchestrator
//!
//! This is the main CLI entry point for Ensemble.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ensemble::config::{OrchestratorConfig, QuorumPolicy};
use ensemble::orchestrator::ClusterOrchestrator;
use ensemble::planner::RoleLaunchPlanner;
use ensemble::provider::provider_for;
use ensemble::script::ScriptMode;
use ensemble::service::ServiceRegistry;
use ensemble::spec::{ClusterSpec, ClusterSpecParser, SpecOverrides};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Ensemble - cluster provisioning orchestrator
#[derive(Parser)]
#[command(name = "ensemble")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Provision clusters of distributed services", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a role and wire its nodes into a cluster
    Launch {
        #[command(flatten)]
        spec: SpecArgs,
        /// Role to launch
        #[arg(short, long)]
        role: String,
        /// Print the cluster as JSON
        #[arg(long)]
        json: bool,
        /// Fail unless at least this many nodes come up
        #[arg(long, conflicts_with = "majority")]
        min_nodes: Option<usize>,
        /// Fail unless a majority of the requested nodes come up
        #[arg(long)]
        majority: bool,
        /// Download scripts locally and send their content to the nodes
        #[arg(long)]
        inline_scripts: bool,
    },

    /// Show the launch plan for a role without creating anything
    Plan {
        #[command(flatten)]
        spec: SpecArgs,
        /// Role to plan
        #[arg(short, long)]
        role: String,
    },

    /// Validate a cluster spec file
    Validate {
        /// Cluster spec file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List built-in services
    Services,
}

/// Spec file plus overrides
#[derive(Args)]
struct SpecArgs {
    /// Cluster spec file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the cluster name
    #[arg(long)]
    cluster_name: Option<String>,
    /// Override the service name
    #[arg(long)]
    service_name: Option<String>,
    /// Override the compute provider
    #[arg(long)]
    provider: Option<String>,
    /// Override the script base location
    #[arg(long)]
    run_url_base: Option<String>,
    /// Public key file
    #[arg(long)]
    public_key_file: Option<PathBuf>,
    /// Private key file
    #[arg(long)]
    private_key_file: Option<PathBuf>,
    /// Instance count override (role=count)
    #[arg(short, long)]
    instances: Vec<String>,
}

impl SpecArgs {
    fn load(self) -> anyhow::Result<ClusterSpec> {
        let path = spec_file(self.config)?;
        let overrides = SpecOverrides {
            cluster_name: self.cluster_name,
            service_name: self.service_name,
            provider: self.provider,
            run_url_base: self.run_url_base,
            public_key_file: self.public_key_file,
            private_key_file: self.private_key_file,
            instances: self.instances,
        };

        ClusterSpecParser::load_file(&path, &overrides)
            .with_context(|| format!("Failed to load cluster spec {}", path.display()))
    }
}

fn spec_file(config: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match config {
        Some(path) => Ok(path),
        None => ClusterSpecParser::find_spec_file(Path::new(".")).context(
            "No cluster spec found (ensemble.yaml or ensemble.yml); use --config",
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let registry = ServiceRegistry::builtin();

    match cli.command {
        Commands::Launch {
            spec,
            role,
            json,
            min_nodes,
            majority,
            inline_scripts,
        } => {
            let spec = spec.load()?;
            let service = registry.create(&spec.service_name)?;
            let provider = provider_for(&spec)?;

            let quorum = match (min_nodes, majority) {
                (Some(n), _) => QuorumPolicy::AtLeast(n),
                (None, true) => QuorumPolicy::Majority,
                (None, false) => QuorumPolicy::Permissive,
            };
            let script_mode = if inline_scripts {
                ScriptMode::Inline
            } else {
                ScriptMode::RunUrl
            };

            let cluster = ClusterOrchestrator::new(provider, service)
                .with_config(OrchestratorConfig {
                    quorum,
                    script_mode,
                })
                .launch_cluster(&spec, &role)
                .await
                .with_context(|| format!("Failed to launch {}", spec.cluster_name))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&cluster)?);
            } else {
                println!("Cluster {} launched", cluster.name());
                println!("ORDINAL   NODE                                   PUBLIC                PRIVATE");
                for instance in cluster.instances() {
                    println!(
                        "{:<9} {:<38} {:<21} {}",
                        instance.ordinal(),
                        instance.id(),
                        instance.public_address(),
                        instance.private_address()
                    );
                }
                println!("Endpoint: {}", cluster.service_endpoint());
            }
        }

        Commands::Plan { spec, role } => {
            let spec = spec.load()?;
            let service = registry.create(&spec.service_name)?;
            let plan = RoleLaunchPlanner::new(service).plan(&spec, &role)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }

        Commands::Validate { config } => {
            let path = spec_file(config)?;
            let doc = ClusterSpecParser::parse_file(&path)?;
            let warnings = ClusterSpecParser::validate(&doc)?;

            if let Some(ref name) = doc.service_name {
                registry.create(name)?;
            }

            if warnings.is_empty() {
                println!("{} is valid", path.display());
            } else {
                for warning in warnings {
                    println!("WARNING: {}", warning);
                }
            }
        }

        Commands::Services => {
            println!("SERVICE      ROLE         PORTS");
            for service in registry.list() {
                for role in service.roles() {
                    let ports = service
                        .ports(role)?
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<_>>()
                        .join(",");
                    println!("{:<12} {:<12} {}", service.name(), role, ports);
                }
            }
        }
    }

    Ok(())
}
