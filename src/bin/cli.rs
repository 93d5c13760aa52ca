use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hostfit::config::{Config, CONFIG_FILE};
use hostfit::contract::{self, EnvironmentContract};
use hostfit::error::FitError;
use hostfit::fleet::{self, FleetPolicy};
use hostfit::host::{self, LocalPortProbe};
use hostfit::output::OutputFormat;
use hostfit::profile::HostProfile;
use hostfit::rules::{registry, RuleEngine, Severity};
use hostfit::CheckOptions;

#[derive(Parser)]
#[command(
    name = "hostfit",
    about = "Predicts whether a repository will run on this machine",
    version,
    author
)]
struct Cli {
    /// Verbose output and debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a repository against this machine (or a described host)
    Scan {
        /// Path to the repository
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output format (console, json, markdown, sarif)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Host description JSON to check against instead of this machine
        #[arg(long)]
        host_file: Option<PathBuf>,

        /// CI mode: exit 1 when the policy fails
        #[arg(long, env = "HOSTFIT_CI")]
        ci: bool,

        /// Minimum severity to fail (info, low, medium, high)
        #[arg(long)]
        fail_on: Option<String>,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Describe a rule
    Explain {
        /// Rule id, e.g. python_version_mismatch
        rule: String,
    },

    /// List all built-in rules
    ListRules {
        /// Output format (table, json)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,
    },

    /// Print this machine's host profile as JSON
    Host,

    /// Check every repository under a directory
    Audit {
        #[arg(default_value = ".")]
        dir: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Fleet scan with aggregation and a fleet policy
    Fleet {
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Fleet policy YAML (fail_on, max_repos, max_depth)
        #[arg(long)]
        policy: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Would this repository run on the described host?
    Sim {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Host description JSON
        #[arg(long = "host", short = 'H')]
        host: PathBuf,
    },

    /// Environment contracts
    Contract {
        #[command(subcommand)]
        action: ContractAction,
    },

    /// Generate a starter .hostfit.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ContractAction {
    /// Generate a contract from a repository
    Gen {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Write the contract here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Validate this machine against a contract
    Check { file: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let verbose = cli.verbose;

    let result = match cli.command {
        Commands::Scan {
            path,
            format,
            host_file,
            ci,
            fail_on,
            config,
            output,
        } => cmd_scan(ScanArgs {
            path,
            format,
            host_file,
            ci,
            fail_on,
            config,
            output,
            verbose,
        }),
        Commands::Explain { rule } => cmd_explain(&rule),
        Commands::ListRules { format } => cmd_list_rules(format),
        Commands::Host => cmd_host(),
        Commands::Audit { dir, json } => cmd_audit(&dir, json),
        Commands::Fleet { dir, policy, json } => cmd_fleet(&dir, policy.as_deref(), json),
        Commands::Sim { path, host } => cmd_sim(&path, &host),
        Commands::Contract { action } => match action {
            ContractAction::Gen { path, output } => cmd_contract_gen(&path, output),
            ContractAction::Check { file } => cmd_contract_check(&file),
        },
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct ScanArgs {
    path: PathBuf,
    format: String,
    host_file: Option<PathBuf>,
    ci: bool,
    fail_on: Option<String>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    verbose: bool,
}

fn cmd_scan(args: ScanArgs) -> Result<i32, FitError> {
    let format = OutputFormat::from_str_lenient(&args.format).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", args.format);
        OutputFormat::Console
    });

    let fail_on = args.fail_on.and_then(|s| {
        let sev = Severity::from_str_lenient(&s);
        if sev.is_none() {
            eprintln!("Warning: unknown severity '{}', using config default", s);
        }
        sev
    });

    let options = CheckOptions {
        config_path: args.config,
        host_file: args.host_file,
        fail_on_override: fail_on,
    };

    let report = hostfit::check(&args.path, &options)?;
    let rendered = hostfit::render_report(&report, format, args.verbose)?;

    match args.output {
        Some(out) => std::fs::write(&out, &rendered)?,
        None => print!("{}", rendered),
    }

    // Exit code: 0 = pass, 1 = findings at or above threshold (CI mode only)
    Ok(if args.ci && !report.verdict.pass { 1 } else { 0 })
}

fn cmd_explain(rule_id: &str) -> Result<i32, FitError> {
    let Some(meta) = registry::explain(rule_id) else {
        eprintln!("Unknown rule: {rule_id}");
        let suggestions = registry::suggest(rule_id);
        if !suggestions.is_empty() {
            eprintln!("Did you mean: {}?", suggestions.join(", "));
        }
        return Ok(1);
    };

    println!("{} ({})", meta.id, meta.name);
    println!();
    println!("  Severity:  {}", meta.severity.label());
    println!("  Category:  {}", meta.category);
    println!("  Cluster:   {}", meta.cluster);
    println!();
    println!("  {}", meta.description);
    println!();
    println!("  When: {}", meta.when);
    println!("  Fix:  {}", meta.fix);
    Ok(0)
}

fn cmd_list_rules(format_str: String) -> Result<i32, FitError> {
    let engine = RuleEngine::new();
    let rules = engine.list_rules();

    match format_str.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&rules)?;
            println!("{}", json);
        }
        _ => {
            println!("{:<30} {:<10} {:<12} NAME", "ID", "SEVERITY", "CLUSTER");
            println!("{}", "-".repeat(86));
            for rule in &rules {
                println!(
                    "{:<30} {:<10} {:<12} {}",
                    rule.id,
                    rule.severity.label(),
                    rule.cluster,
                    rule.name,
                );
            }
        }
    }

    Ok(0)
}

fn cmd_host() -> Result<i32, FitError> {
    let host = host::inspect_host();
    println!("{}", serde_json::to_string_pretty(&host)?);
    Ok(0)
}

fn cmd_audit(dir: &Path, json: bool) -> Result<i32, FitError> {
    let host = host::inspect_host();
    let summaries = fleet::audit(dir, &host, Arc::new(LocalPortProbe))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(0);
    }
    if summaries.is_empty() {
        println!("No repos found.");
        return Ok(0);
    }

    let high = summaries.iter().filter(|s| s.has_high).count();
    let medium = summaries
        .iter()
        .filter(|s| s.rule_count > 0 && !s.has_high)
        .count();
    let clean = summaries.len() - high - medium;
    println!(
        "Found {} repos. {} high-risk. {} medium. {} clean.\n",
        summaries.len(),
        high,
        medium,
        clean
    );
    for s in &summaries {
        let status = if s.has_high {
            "HIGH"
        } else if s.rule_count > 0 {
            "MEDIUM"
        } else {
            "OK"
        };
        let mut preview = s.rules.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
        if preview.is_empty() {
            preview = "none".into();
        } else if s.rules.len() > 5 {
            preview.push_str(" ...");
        }
        println!(
            "  [{:<6}] {} ({}%): {} issue(s): {}",
            status, s.name, s.score, s.rule_count, preview
        );
    }
    Ok(0)
}

fn cmd_fleet(dir: &Path, policy: Option<&Path>, json: bool) -> Result<i32, FitError> {
    let policy = FleetPolicy::load(policy)?;
    let host = host::inspect_host();
    let report = fleet::fleet_scan(dir, &policy, &host, Arc::new(LocalPortProbe))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Scanned {} repos. {} violate the fleet policy (fail_on: {}).",
            report.total_repos_scanned, report.violations, report.policy.fail_on
        );
        if !report.most_common_rules.is_empty() {
            println!("\nMost common rules:");
            for r in &report.most_common_rules {
                println!("  {:<30} {}", r.rule_id, r.count);
            }
        }
        if !report.risk_clusters.is_empty() {
            println!("\nRisk clusters:");
            for c in &report.risk_clusters {
                println!("  {:<30} {}", c.cluster, c.count);
            }
        }
    }
    Ok(if report.violations > 0 { 1 } else { 0 })
}

fn cmd_sim(path: &Path, host_file: &Path) -> Result<i32, FitError> {
    let report = fleet::simulate(path, host_file, &CheckOptions::default())?;
    println!("Repo: {}", report.repo.display_name());
    println!("Target host: {}\n", report.host.summary());

    let issues: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.severity != Severity::Info)
        .collect();
    if issues.is_empty() {
        println!("OK: No incompatibilities for target host.");
        return Ok(0);
    }
    println!(
        "{} issue(s) on target host (estimated success {}%):",
        issues.len(),
        report.score.probability
    );
    for f in issues {
        println!("  [{}] {}: {}", f.severity.label(), f.rule_id, f.message);
    }
    Ok(1)
}

fn cmd_contract_gen(path: &Path, output: Option<PathBuf>) -> Result<i32, FitError> {
    let config = hostfit::load_config(path, None)?;
    let repo = hostfit::scanner::scan_repo(path, &config.scan)?;
    let json = contract::generate_contract(&repo).to_json()?;
    match output {
        Some(out) => {
            std::fs::write(&out, format!("{json}\n"))?;
            println!("Wrote {}", out.display());
        }
        None => println!("{json}"),
    }
    Ok(0)
}

fn cmd_contract_check(file: &Path) -> Result<i32, FitError> {
    let contract = EnvironmentContract::load(file)?;
    let host: HostProfile = host::inspect_host();
    let violations = contract::validate_contract(&contract, &host);
    if violations.is_empty() {
        println!("OK: Host satisfies contract for {}.", contract.repo);
        return Ok(0);
    }
    eprintln!("Contract violations:");
    for v in &violations {
        eprintln!("  {}: {}", v.requirement, v.reason);
    }
    Ok(1)
}

fn cmd_init(force: bool) -> Result<i32, FitError> {
    let path = PathBuf::from(CONFIG_FILE);

    if path.exists() && !force {
        eprintln!("{CONFIG_FILE} already exists. Use --force to overwrite.");
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created {CONFIG_FILE}");

    Ok(0)
}
