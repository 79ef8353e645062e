use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use warden::{check_policies, AuthorizationService, WardenConfig, WardenError, WardenResult};
use warden_policy::{parse_records, AccessRequest, AuthorizationPolicy, PermissionContext};
use warden_store::InMemoryPolicyRepository;

/// Warden: attribute-based authorization policies
///
/// Evaluates exported policy tables offline: decisions, effective
/// permissions, and policy health checks.
#[derive(Parser, Debug)]
#[command(name = "warden", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decide a single access request
    Evaluate {
        /// JSON array of stored policy records
        #[arg(long)]
        policies: PathBuf,

        /// JSON access request
        #[arg(long)]
        request: PathBuf,

        /// Print the deciding tier and policies as JSON
        #[arg(long)]
        explain: bool,
    },

    /// List the actions a subject may perform on a resource
    Permissions {
        /// JSON array of stored policy records
        #[arg(long)]
        policies: PathBuf,

        /// JSON permission context (an access request without an action)
        #[arg(long)]
        context: PathBuf,

        /// JSON array of actions; defaults to the configured catalog
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Report undecodable or invalid policies
    Check {
        /// JSON array of stored policy records
        #[arg(long)]
        policies: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("warden=debug,warden_policy=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warden=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> WardenResult<WardenConfig> {
    match path {
        Some(p) => WardenConfig::load(p),
        None => {
            let default_path = WardenConfig::default_config_path();
            WardenConfig::load(&default_path)
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> WardenResult<T> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| WardenError::Serialization(format!("{}: {}", path.display(), e)))
}

fn load_repository(path: &Path) -> WardenResult<InMemoryPolicyRepository> {
    let contents = std::fs::read_to_string(path)?;
    Ok(InMemoryPolicyRepository::from_json(&contents)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> WardenResult<ExitCode> {
    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Evaluate {
            policies,
            request,
            explain,
        } => cmd_evaluate(&config, &policies, &request, explain),
        Commands::Permissions {
            policies,
            context,
            catalog,
        } => cmd_permissions(&config, &policies, &context, catalog.as_deref()),
        Commands::Check { policies } => cmd_check(&policies),
    }
}

fn cmd_evaluate(
    config: &WardenConfig,
    policies: &Path,
    request: &Path,
    explain: bool,
) -> WardenResult<ExitCode> {
    let service = AuthorizationService::new(load_repository(policies)?, config);
    let request: AccessRequest = read_json(request)?;

    let evaluation = service.explain(&request)?;
    info!(
        organization_id = %request.organization_id,
        action = %request.action,
        decision = %evaluation.decision,
        "request evaluated"
    );

    if explain {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    } else {
        println!("{}", evaluation.decision);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_permissions(
    config: &WardenConfig,
    policies: &Path,
    context: &Path,
    catalog: Option<&Path>,
) -> WardenResult<ExitCode> {
    let service = AuthorizationService::new(load_repository(policies)?, config);
    let context: PermissionContext = read_json(context)?;
    let catalog: Vec<String> = match catalog {
        Some(path) => read_json(path)?,
        None => config.catalog.actions.clone(),
    };

    let permissions = service.effective_permissions(&context, &catalog)?;
    println!("{}", serde_json::to_string_pretty(&permissions)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(policies: &Path) -> WardenResult<ExitCode> {
    let contents = std::fs::read_to_string(policies)?;
    let parsed = parse_records(&contents)?;
    let policies: Vec<AuthorizationPolicy> = parsed
        .records
        .iter()
        .map(AuthorizationPolicy::from_record)
        .collect();
    let issues = check_policies(&policies);

    if issues.is_empty() && parsed.rejected.is_empty() {
        println!("{} policies checked, no issues found.", policies.len());
        return Ok(ExitCode::SUCCESS);
    }

    for row in &parsed.rejected {
        println!(
            "row {} ({}): unreadable: {}",
            row.index,
            row.id.as_deref().unwrap_or("no id"),
            row.message
        );
    }
    for issue in &issues {
        println!(
            "{} [{}] {}: {}",
            issue.policy_id, issue.organization_id, issue.name, issue.problem
        );
    }
    println!(
        "{} issue(s) in {} policies checked, {} row(s) rejected.",
        issues.len(),
        policies.len(),
        parsed.rejected.len()
    );
    Ok(ExitCode::FAILURE)
}
