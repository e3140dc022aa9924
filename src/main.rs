//! Lifecycle Fixtures - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use lifecycle_fixtures::{
    build_lifecycle, build_sku_lookup, build_usage, configure_lifecycle_scenario,
    configure_sku_scenario, configure_usage_scenario, FixtureConfig, InMemoryMockServer,
    ResourceKind, ScenarioParams, TemplateEngine, UsagePlan,
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// What to program on the mock server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Single-resource lifecycle
    Lifecycle(ResourceKind),
    /// Composite usage scenario over every resource in the parameters
    Usage,
    /// Read-only SKU lookup
    Skus,
}

impl Target {
    fn default_scenario(&self) -> String {
        match self {
            Target::Lifecycle(kind) => format!("{}-lifecycle", kind),
            Target::Usage => "usage".to_string(),
            Target::Skus => "sku-lookup".to_string(),
        }
    }
}

fn parse_target(value: &str) -> Result<Target, String> {
    match value {
        "usage" => Ok(Target::Usage),
        "skus" => Ok(Target::Skus),
        other => other
            .parse::<ResourceKind>()
            .map(Target::Lifecycle)
            .map_err(|e| e.to_string()),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "lifecycle-fixtures",
    about = "Stateful mock fixtures for control-plane resource lifecycles",
    version
)]
struct Args {
    /// Path to scenario parameters
    #[arg(short, long, default_value = "fixtures.yaml")]
    params: PathBuf,

    /// Path to fixture configuration (defaults apply when absent)
    #[arg(short, long, default_value = "fixture-config.yaml")]
    config: PathBuf,

    /// Scenario name (defaults to one derived from --kind)
    #[arg(short, long)]
    scenario: Option<String>,

    /// Resource kind, "usage" or "skus"
    #[arg(short, long, default_value = "workspace", value_parser = parse_target)]
    kind: Target,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and parameters and exit
    #[arg(long)]
    validate: bool,

    /// Register into an in-memory server and print the stubs instead
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Print default config if requested
    if args.print_config {
        println!("{}", serde_yaml::to_string(&FixtureConfig::default())?);
        return Ok(());
    }

    // Load configuration
    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        FixtureConfig::from_file(&args.config)?
    } else {
        info!("Using default configuration");
        FixtureConfig::default()
    };

    if !args.params.exists() {
        anyhow::bail!("Parameters file not found: {:?}", args.params);
    }
    info!(path = ?args.params, "Loading scenario parameters");
    let params = ScenarioParams::from_file(&args.params)?;

    // Validate and exit if requested
    if args.validate {
        config.validate()?;
        let plan = match args.kind {
            Target::Usage => Some(UsagePlan::from_params(&params)?),
            _ => None,
        };
        println!(
            "Configuration is valid ({} resources, {} skus{})",
            params.resources.kinds().len(),
            params.skus.len(),
            plan.map(|p| format!(", usage plan of {} kinds", p.kinds().len()))
                .unwrap_or_default()
        );
        return Ok(());
    }

    let scenario = args
        .scenario
        .clone()
        .unwrap_or_else(|| args.kind.default_scenario());

    if args.dry_run {
        let server = InMemoryMockServer::new();
        let engine = TemplateEngine::new()?;
        let stubs = match args.kind {
            Target::Lifecycle(kind) => {
                build_lifecycle(&server, &engine, kind, &scenario, &params, &config).await?
            }
            Target::Usage => {
                let plan = UsagePlan::from_params(&params)?;
                build_usage(&server, &engine, &scenario, &plan, &params, &config).await?
            }
            Target::Skus => build_sku_lookup(&server, &engine, &scenario, &params, &config).await?,
        };
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "mappings": stubs }))?);
        return Ok(());
    }

    let client = match args.kind {
        Target::Lifecycle(kind) => {
            configure_lifecycle_scenario(kind, &scenario, &params, &config).await?
        }
        Target::Usage => configure_usage_scenario(&scenario, &params, &config).await?,
        Target::Skus => configure_sku_scenario(&scenario, &params, &config).await?,
    };
    info!(
        scenario = %scenario,
        mock_url = %client.base_url(),
        "Mock server programmed"
    );

    Ok(())
}
