use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kf_client::{ResourceClient, ResourceClientExt};
use kf_core::prelude::*;
use kf_core::space::UNDEFINED_QUOTA;
use kf_core::{QuotaRequest, RouteClaimSpec, ServiceSpec, SpaceSpec};
use kf_kubehub::{KubeLogTailer, KubeResourceClient, KubeServingFactory};
use kf_push::{AppLister, ContainerCliBuilder, PushOptions, Pusher};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "kfctl", version, about = "kf CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Namespace to operate in
    #[arg(short = 'n', long = "namespace", global = true, env = "KF_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build (if needed) and deploy an app
    Push {
        app_name: String,
        /// Source directory to build (defaults to the current directory)
        #[arg(long = "path")]
        path: Option<PathBuf>,
        /// Registry the source image is pushed to
        #[arg(long = "container-registry")]
        container_registry: Option<String>,
        /// Prebuilt image to deploy instead of building source
        #[arg(long = "docker-image")]
        docker_image: Option<String>,
        /// Service account used by the build and the running app
        #[arg(long = "service-account")]
        service_account: Option<String>,
        /// Build template to instantiate (default: buildpack)
        #[arg(long = "build-template")]
        build_template: Option<String>,
    },
    /// Set quota limits on a space
    CreateQuota {
        space_name: String,
        /// Memory limit, e.g. 10Gi
        #[arg(short = 'm', long = "memory", default_value = UNDEFINED_QUOTA)]
        memory: String,
        /// CPU limit, e.g. 400m
        #[arg(short = 'c', long = "cpu", default_value = UNDEFINED_QUOTA)]
        cpu: String,
        /// Maximum number of routes
        #[arg(short = 'r', long = "routes", default_value = UNDEFINED_QUOTA)]
        routes: String,
    },
    /// Show the quota of a space
    Quota { space_name: String },
    /// Remove every quota limit from a space
    DeleteQuota { space_name: String },
    /// Claim a route in the namespace
    CreateRoute {
        domain: String,
        #[arg(long = "hostname", default_value = "")]
        hostname: String,
        #[arg(long = "path", default_value = "")]
        path: String,
    },
    /// List route claims in the namespace
    Routes,
}

fn init_tracing() {
    let env = std::env::var("KF_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KF_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KF_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let ns = cli.namespace.as_str();

    match cli.command {
        Commands::Push { app_name, path, container_registry, docker_image, service_account, build_template } => {
            let opts = PushOptions {
                namespace: Some(ns.to_string()),
                path,
                container_registry,
                docker_image,
                service_account,
                build_template,
            };
            // Reject bad input before touching the cluster.
            opts.validate(&app_name)?;
            info!(app = %app_name, ns = %ns, "push invoked");
            let client = kf_kubehub::get_kube_client().await?;
            let services: Arc<dyn ResourceClient<ServiceSpec>> = Arc::new(KubeResourceClient::<ServiceSpec>::new(client.clone()));
            let lister: Arc<dyn AppLister> = Arc::new(services);
            let pusher = Pusher::new(
                lister,
                Arc::new(KubeServingFactory::new()),
                Arc::new(ContainerCliBuilder::from_env()),
                Arc::new(KubeLogTailer::new(client, app_name.as_str())),
            );
            pusher.push(&app_name, &opts).await.with_context(|| format!("pushing {}", app_name))?;
        }
        Commands::CreateQuota { space_name, memory, cpu, routes } => {
            let req = QuotaRequest::from_flags(&memory, &cpu, &routes);
            info!(space = %space_name, ?req, "create-quota invoked");
            let spaces = KubeResourceClient::<SpaceSpec>::new(kf_kubehub::get_kube_client().await?);
            spaces.transform("", &space_name, |space| req.apply(space)).await?;
            println!("Quota in space {:?} successfully created", space_name);
        }
        Commands::Quota { space_name } => {
            let spaces = KubeResourceClient::<SpaceSpec>::new(kf_kubehub::get_kube_client().await?);
            let space = spaces.get("", &space_name).await?;
            match cli.output {
                Output::Human => {
                    if space.spec.quota().is_empty() {
                        println!("No quota set in space {:?}", space_name);
                    }
                    for (resource, limit) in space.spec.quota() {
                        println!("{:<28} {}", resource, limit);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(space.spec.quota())?),
            }
        }
        Commands::DeleteQuota { space_name } => {
            info!(space = %space_name, "delete-quota invoked");
            let spaces = KubeResourceClient::<SpaceSpec>::new(kf_kubehub::get_kube_client().await?);
            spaces
                .transform("", &space_name, |space| {
                    space.clear_quota();
                    Ok(())
                })
                .await?;
            println!("Quota in space {:?} successfully deleted", space_name);
        }
        Commands::CreateRoute { domain, hostname, path } => {
            let desired = RouteClaimSpec::new(hostname, domain, path);
            let name = desired.object_name();
            info!(ns = %ns, name = %name, "create-route invoked");
            let routes = KubeResourceClient::<RouteClaimSpec>::new(kf_kubehub::get_kube_client().await?);
            // An existing claim is kept as is.
            let claim = routes.upsert(ns, &name, desired, |_, existing| existing).await?;
            println!("Route {} claimed in namespace {:?}", claim.spec.host_path(), ns);
        }
        Commands::Routes => {
            let routes = KubeResourceClient::<RouteClaimSpec>::new(kf_kubehub::get_kube_client().await?);
            let claims = routes.list(ns, &ListOptions::default()).await?;
            match cli.output {
                Output::Human => {
                    println!("{:<20} {:<28} {}", "HOSTNAME", "DOMAIN", "PATH");
                    for c in claims.iter() {
                        let host = if c.spec.hostname.is_empty() { "-" } else { c.spec.hostname.as_str() };
                        let path = if c.spec.path.is_empty() { "/" } else { c.spec.path.as_str() };
                        println!("{:<20} {:<28} {}", host, c.spec.domain, path);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&claims)?),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_flags_default_to_undefined() {
        let cli = Cli::try_parse_from(["kfctl", "create-quota", "dev", "-m", "10Gi"]).unwrap();
        match cli.command {
            Commands::CreateQuota { space_name, memory, cpu, routes } => {
                assert_eq!(space_name, "dev");
                assert_eq!(memory, "10Gi");
                assert_eq!(cpu, "undefined");
                assert_eq!(routes, "undefined");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn push_flags_and_namespace() {
        let cli = Cli::try_parse_from([
            "kfctl",
            "push",
            "app",
            "-n",
            "team",
            "--container-registry",
            "reg.io",
            "--service-account",
            "builder",
        ])
        .unwrap();
        assert_eq!(cli.namespace, "team");
        match cli.command {
            Commands::Push { app_name, container_registry, docker_image, path, .. } => {
                assert_eq!(app_name, "app");
                assert_eq!(container_registry.as_deref(), Some("reg.io"));
                assert!(docker_image.is_none());
                assert!(path.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn route_flags() {
        let cli = Cli::try_parse_from(["kfctl", "create-route", "example.com", "--hostname", "www", "-o", "json"]).unwrap();
        assert_eq!(cli.output, Output::Json);
        match cli.command {
            Commands::CreateRoute { domain, hostname, path } => {
                assert_eq!((domain.as_str(), hostname.as_str(), path.as_str()), ("example.com", "www", ""));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
