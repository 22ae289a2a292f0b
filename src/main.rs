//! Stacks Lint CLI - command-line interface for convention checks
//!
//! Architecture: Application Layer - CLI coordinates user interactions with domain services
//! - Translates user commands to analyzer operations
//! - Owns process concerns: exit codes, terminal output, logging setup
//! - `anyhow` adds context to failures at this edge only

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use stacks_lint::analyzer::csharp::CSharpScanner;
use stacks_lint::config::CONFIG_FILE_NAMES;
use stacks_lint::{
    rules, AnalysisOptions, Category, OutputFormat, ReportOptions, Severity, SourceFrontend, StacksConfig,
    StacksValidator, ValidationOptions,
};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Stacks Lint - convention checks for Slalom Stacks C# code
#[derive(Parser)]
#[command(name = "stacks-lint")]
#[command(version)]
#[command(about = "Convention checks for Slalom Stacks messaging code")]
#[command(
    long_about = "Stacks Lint checks C# code built on Slalom Stacks for naming, immutability and use case conventions: commands and events are named by their role, messages are immutable, and every use case has business rules and an implementation."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check files for convention violations
    Check {
        /// Paths to analyze (files or directories)
        paths: Vec<PathBuf>,

        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormatArg,

        /// Minimum severity level to report
        #[arg(short, long, value_enum)]
        severity: Option<SeverityArg>,

        /// Maximum number of diagnostics to report
        #[arg(long)]
        max_diagnostics: Option<usize>,

        /// Additional exclude patterns
        #[arg(long, action = clap::ArgAction::Append)]
        exclude: Vec<String>,

        /// Ignore .stacksignore files
        #[arg(long)]
        no_ignore: bool,

        /// Disable parallel processing
        #[arg(long)]
        no_parallel: bool,

        /// Fail on the first file that cannot be read or scanned
        #[arg(long)]
        fail_fast: bool,

        /// Hide fix suggestions
        #[arg(long)]
        no_fixes: bool,
    },

    /// Watch for file changes and re-run checks
    Watch {
        /// Path to watch (defaults to current directory)
        path: Option<PathBuf>,

        /// Debounce delay in milliseconds
        #[arg(long, default_value = "500")]
        delay: u64,
    },

    /// Validate a configuration file
    ValidateConfig {
        config_file: Option<PathBuf>,
    },

    /// Explain what a diagnostic code means
    Explain {
        /// Diagnostic code, e.g. SS101
        code: String,
    },

    /// List available rules
    Rules {
        /// Show only enabled rules
        #[arg(long)]
        enabled_only: bool,

        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
enum OutputFormatArg {
    Human,
    Json,
    Junit,
    Sarif,
    Github,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Junit => OutputFormat::Junit,
            OutputFormatArg::Sarif => OutputFormat::Sarif,
            OutputFormatArg::Github => OutputFormat::GitHub,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum SeverityArg {
    Warning,
    Error,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Warning => Severity::Warning,
            SeverityArg::Error => Severity::Error,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CategoryArg {
    Naming,
    Messaging,
    Rules,
    Analyzer,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Naming => Category::Naming,
            CategoryArg::Messaging => Category::Messaging,
            CategoryArg::Rules => Category::Rules,
            CategoryArg::Analyzer => Category::Analyzer,
        }
    }
}

/// Settings of the `check` command
struct CheckArgs {
    paths: Vec<PathBuf>,
    format: OutputFormatArg,
    severity: Option<SeverityArg>,
    max_diagnostics: Option<usize>,
    exclude: Vec<String>,
    no_ignore: bool,
    no_parallel: bool,
    fail_fast: bool,
    show_fixes: bool,
    use_colors: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match run_command(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(2);
        }
    }
}

async fn run_command(cli: Cli) -> Result<i32> {
    let use_colors = !cli.no_color;
    match cli.command {
        Commands::Check { paths, format, severity, max_diagnostics, exclude, no_ignore, no_parallel, fail_fast, no_fixes } => {
            let args = CheckArgs {
                paths,
                format,
                severity,
                max_diagnostics,
                exclude,
                no_ignore,
                no_parallel,
                fail_fast,
                show_fixes: !no_fixes,
                use_colors,
            };
            run_check(cli.config.as_deref(), args).await
        }
        Commands::Watch { path, delay } => run_watch(cli.config, path, delay, use_colors).await,
        Commands::ValidateConfig { config_file } => run_validate_config(config_file.or(cli.config)),
        Commands::Explain { code } => run_explain(&code),
        Commands::Rules { enabled_only, category } => {
            run_list_rules(cli.config.as_deref(), enabled_only, category.map(Category::from))
        }
    }
}

/// Explicit path, else a conventional file in the current directory, else defaults
fn load_config(config_path: Option<&Path>) -> Result<StacksConfig> {
    if let Some(path) = config_path {
        return StacksConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    match StacksConfig::discover(".") {
        Some(found) => {
            debug!("Using configuration {}", found.display());
            StacksConfig::load_from_file(&found)
                .with_context(|| format!("Failed to load configuration from {}", found.display()))
        }
        None => Ok(StacksConfig::default()),
    }
}

async fn run_check(config_path: Option<&Path>, args: CheckArgs) -> Result<i32> {
    let config = load_config(config_path)?;
    let validator = StacksValidator::new_with_config(config).context("Invalid configuration")?;

    let paths = if args.paths.is_empty() { vec![PathBuf::from(".")] } else { args.paths };
    let format: OutputFormat = args.format.into();

    let options = ValidationOptions {
        output_format: format,
        report_options: ReportOptions {
            use_colors: args.use_colors,
            show_fixes: args.show_fixes,
            max_diagnostics: args.max_diagnostics,
            min_severity: args.severity.map(Severity::from),
        },
        analysis_options: AnalysisOptions {
            parallel: !args.no_parallel,
            fail_fast: args.fail_fast,
            exclude_patterns: args.exclude,
            ignore_ignore_files: args.no_ignore,
            ..Default::default()
        },
    };

    let report = validator.check_with_options(paths, &options).await.context("Analysis failed")?;

    let formatter = stacks_lint::ReportFormatter::new(options.report_options.clone());
    println!("{}", formatter.format_report(&report, format)?);

    Ok(if report.has_errors() { 1 } else { 0 })
}

async fn run_watch(config_path: Option<PathBuf>, path: Option<PathBuf>, delay_ms: u64, use_colors: bool) -> Result<i32> {
    use notify::{RecursiveMode, Watcher};

    let watch_path = path.unwrap_or_else(|| PathBuf::from("."));
    let debounce = Duration::from_millis(delay_ms);

    println!("🔍 Watching {} (debounce {}ms, Ctrl+C to stop)", watch_path.display(), delay_ms);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            // receiver gone means we are shutting down
            let _ = tx.send(event);
        }
        Err(e) => warn!("Watch error: {}", e),
    })
    .context("Failed to create file watcher")?;
    watcher
        .watch(&watch_path, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch '{}'", watch_path.display()))?;

    let mut config = load_config(config_path.as_deref())?;
    run_watch_analysis(&config, &watch_path, use_colors).await;

    let scanner = CSharpScanner::new();
    while let Some(event) = rx.recv().await {
        let mut change = classify_event(&event, &scanner);
        if change == WatchChange::Ignored {
            continue;
        }

        // collapse bursts of events into one run
        tokio::time::sleep(debounce).await;
        while let Ok(event) = rx.try_recv() {
            change = change.max(classify_event(&event, &scanner));
        }

        if change == WatchChange::Config {
            match load_config(config_path.as_deref()) {
                Ok(reloaded) => {
                    println!("🔄 Configuration reloaded");
                    config = reloaded;
                }
                Err(e) => eprintln!("⚠️  Keeping previous configuration: {e:#}"),
            }
        }

        print!("\x1B[2J\x1B[H");
        run_watch_analysis(&config, &watch_path, use_colors).await;
    }

    Ok(0)
}

/// Ordered by how much work a change requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum WatchChange {
    Ignored,
    Source,
    Config,
}

fn classify_event(event: &notify::Event, scanner: &CSharpScanner) -> WatchChange {
    use notify::EventKind;

    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
        return WatchChange::Ignored;
    }

    event
        .paths
        .iter()
        .map(|path| {
            let is_config = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| CONFIG_FILE_NAMES.contains(&name))
                .unwrap_or(false);
            if is_config {
                WatchChange::Config
            } else if scanner.handles_file(path) {
                WatchChange::Source
            } else {
                WatchChange::Ignored
            }
        })
        .max()
        .unwrap_or(WatchChange::Ignored)
}

async fn run_watch_analysis(config: &StacksConfig, watch_path: &Path, use_colors: bool) {
    let validator = match StacksValidator::new_with_config(config.clone()) {
        Ok(validator) => validator.with_report_formatter(stacks_lint::ReportFormatter::new(ReportOptions {
            use_colors,
            ..Default::default()
        })),
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            return;
        }
    };

    match validator.check(vec![watch_path]).await {
        Ok(report) => match validator.format_report(&report, OutputFormat::Human) {
            Ok(formatted) => println!("{formatted}"),
            Err(e) => eprintln!("❌ {e}"),
        },
        Err(e) => eprintln!("❌ Analysis error: {e}"),
    }
    println!("⌚ Watching for changes...");
}

fn run_validate_config(config_path: Option<PathBuf>) -> Result<i32> {
    let config_path = config_path
        .or_else(|| StacksConfig::discover("."))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAMES[0]));

    println!("Validating configuration: {}", config_path.display());

    match StacksConfig::load_from_file(&config_path).and_then(|config| config.rule_set().map(|set| (config, set))) {
        Ok((config, rule_set)) => {
            println!("✅ Configuration is valid");
            println!("📊 Configuration summary:");
            println!("  Markers: {}", if config.markers.strict_identity { "strict identity" } else { "by name or identity" });
            println!("  Rules: {} enabled, {} overridden", rule_set.len(), config.rules.len());
            println!("  Path patterns: {}", config.paths.patterns.len());
            println!("  Fingerprint: {}", config.fingerprint());
            Ok(0)
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed: {e}");
            Ok(1)
        }
    }
}

fn run_explain(code: &str) -> Result<i32> {
    let Some(descriptor) = rules::find_descriptor(code) else {
        eprintln!("❌ Unknown diagnostic code '{code}'");
        println!();
        println!("Available codes:");
        for descriptor in rules::catalog() {
            println!("  {} - {}", descriptor.id, descriptor.title);
        }
        return Ok(1);
    };

    println!("📖 {}: {}", descriptor.id, descriptor.title);
    println!("📂 Category: {}", descriptor.category.as_str());
    println!("⚠️  Default severity: {}", descriptor.severity.as_str());
    println!();
    println!("📝 Message:");
    println!("   {}", descriptor.message_format);
    println!();
    println!("🔎 Description:");
    println!("   {}", descriptor.description);
    Ok(0)
}

fn run_list_rules(config_path: Option<&Path>, enabled_only: bool, category: Option<Category>) -> Result<i32> {
    let config = load_config(config_path)?;
    let rule_set = config.rule_set()?;
    let active = rule_set.descriptors();

    println!("📋 Available Rules\n");
    for descriptor in rules::catalog() {
        if category.map(|c| c != descriptor.category).unwrap_or(false) {
            continue;
        }

        let effective = active.iter().find(|d| d.id == descriptor.id);
        if enabled_only && effective.is_none() {
            continue;
        }

        let status = if effective.is_some() { "✅" } else { "❌" };
        let severity = effective.map(|d| d.severity).unwrap_or(descriptor.severity);
        println!(
            "  {} {} [{}] {} - {}",
            status,
            descriptor.id,
            severity.as_str(),
            descriptor.category.as_str(),
            descriptor.title
        );
    }
    Ok(0)
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn check_args(paths: Vec<PathBuf>) -> CheckArgs {
        CheckArgs {
            paths,
            format: OutputFormatArg::Json,
            severity: None,
            max_diagnostics: None,
            exclude: vec![],
            no_ignore: false,
            no_parallel: false,
            fail_fast: false,
            show_fixes: true,
            use_colors: false,
        }
    }

    #[tokio::test]
    async fn test_check_command_exit_codes() {
        let temp_dir = TempDir::new().unwrap();
        let warning_only = temp_dir.path().join("Added.cs");
        let blocking = temp_dir.path().join("AddedEvent.cs");
        fs::write(&warning_only, "public class Added : Event {}").unwrap();
        fs::write(&blocking, "public class AddedEvent : Event { private int _count; }").unwrap();

        assert_eq!(run_check(None, check_args(vec![warning_only])).await.unwrap(), 0);
        assert_eq!(run_check(None, check_args(vec![blocking])).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_check_with_config_override() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("AddedEvent.cs");
        let config_file = temp_dir.path().join("stacks_lint.yaml");
        fs::write(&source, "public class AddedEvent : Event { private int _count; }").unwrap();
        fs::write(&config_file, "version: \"1.0\"\nrules:\n  SS102:\n    severity: warning\n").unwrap();

        let exit_code = run_check(Some(&config_file), check_args(vec![source])).await.unwrap();
        assert_eq!(exit_code, 0);
    }

    #[test]
    fn test_validate_config() {
        let temp_dir = TempDir::new().unwrap();
        let valid = temp_dir.path().join("valid.yaml");
        let invalid = temp_dir.path().join("invalid.yaml");
        fs::write(&valid, serde_yaml::to_string(&StacksConfig::default()).unwrap()).unwrap();
        fs::write(&invalid, "rules:\n  SS999:\n    enabled: false\n").unwrap();

        assert_eq!(run_validate_config(Some(valid)).unwrap(), 0);
        assert_eq!(run_validate_config(Some(invalid)).unwrap(), 1);
    }

    #[test]
    fn test_explain() {
        assert_eq!(run_explain("SS301").unwrap(), 0);
        assert_eq!(run_explain("ss101").unwrap(), 0);
        assert_eq!(run_explain("SS404").unwrap(), 1);
    }

    #[test]
    fn test_list_rules() {
        assert_eq!(run_list_rules(None, false, None).unwrap(), 0);
        assert_eq!(run_list_rules(None, true, Some(Category::Messaging)).unwrap(), 0);
    }

    #[test]
    fn test_classify_event() {
        use notify::event::{CreateKind, EventKind};

        let scanner = CSharpScanner::new();
        let event = |path: &str| notify::Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from(path));

        assert_eq!(classify_event(&event("src/Add.cs"), &scanner), WatchChange::Source);
        assert_eq!(classify_event(&event("stacks_lint.yaml"), &scanner), WatchChange::Config);
        assert_eq!(classify_event(&event("README.md"), &scanner), WatchChange::Ignored);
        assert_eq!(
            classify_event(&notify::Event::new(EventKind::Any).add_path(PathBuf::from("Add.cs")), &scanner),
            WatchChange::Ignored
        );
    }
}
