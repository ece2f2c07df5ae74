//! The caplint command line: analyze, lint (with `--fix`), and format.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use caplint::{render, Analyzer, Config, Error, Severity, SymbolStore};

const AFTER_HELP: &str = "\
Workflow:
  1. caplint analyze src/            Index and report issues
  2. caplint lint --fix src/         Apply convergent auto-fixes
  3. caplint format src/             Apply the opinionated format
  4. caplint format --check src/     CI gate (exit 1 on differences)

Exit codes:  0=clean  1=errors or check-mode differences  2=internal failure

Configuration is read from .caplint.toml in the working directory.";

const LINT_HELP: &str = "\
Examples:
  caplint lint node.can                 Report issues
  caplint lint --fix node.can           Fix what the rules can fix
  caplint lint --fix --fix-only E001,E008 node.can
  caplint lint --disable E011 src/";

const FORMAT_HELP: &str = "\
Examples:
  caplint format node.can               Rewrite in place
  caplint format --check src/           Report, change nothing";

#[derive(Parser)]
#[command(name = "caplint", version, about = "CAPL static analyzer, linter, and formatter")]
#[command(subcommand_required = true, after_help = AFTER_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Symbol database path.
    #[arg(long, global = true, default_value = "aic.db")]
    db: PathBuf,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract facts into the symbol database and report issues
    Analyze {
        /// CAPL files or directories
        paths: Vec<PathBuf>,
    },
    /// Report issues; optionally apply auto-fixes
    #[command(after_help = LINT_HELP)]
    Lint {
        /// CAPL files or directories
        paths: Vec<PathBuf>,
        /// Rewrite files with the convergent auto-fixer
        #[arg(long)]
        fix: bool,
        /// Only these rule ids may fix (comma separated)
        #[arg(long, value_delimiter = ',')]
        fix_only: Vec<String>,
        /// Rule ids to disable entirely (comma separated)
        #[arg(long, value_delimiter = ',')]
        disable: Vec<String>,
    },
    /// Apply the formatter, or verify formatting with --check
    #[command(after_help = FORMAT_HELP)]
    Format {
        /// CAPL files or directories
        paths: Vec<PathBuf>,
        /// Report whether files would change, without writing
        #[arg(long)]
        check: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match build_analyzer(&cli.db) {
        Err(e) => Err(e),
        Ok(analyzer) => match cli.command {
            Commands::Analyze { ref paths } => run_analyze(&analyzer, paths, cli.json),
            Commands::Lint {
                ref paths,
                fix,
                ref fix_only,
                ref disable,
            } => run_lint(analyzer, paths, fix, fix_only, disable, cli.json),
            Commands::Format { ref paths, check } => run_format(&analyzer, paths, check),
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("caplint: {e}");
            ExitCode::from(2)
        }
    }
}

fn build_analyzer(db: &Path) -> Result<Analyzer, Error> {
    let config = Config::load(Path::new("."))?;
    let store = SymbolStore::open(db)?;
    Ok(Analyzer::new(store, config))
}

/// Expand files and directories into the list of CAPL sources.
fn expand_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
                let p = entry.path();
                let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
                if p.is_file() && (ext == "can" || ext == "cin") {
                    out.push(p.to_path_buf());
                }
            }
        } else {
            out.push(path.clone());
        }
    }
    out.sort();
    out
}

fn run_analyze(analyzer: &Analyzer, paths: &[PathBuf], json: bool) -> Result<ExitCode, Error> {
    let files = expand_paths(paths);
    let mut any_errors = false;
    let mut all_issues = Vec::new();

    for file in &files {
        let bytes = std::fs::read(file)?;
        match analyzer.analyze(file, bytes) {
            Ok(report) => {
                any_errors |= report.has_errors();
                all_issues.extend(report.issues);
            }
            // One file's failure never aborts the batch.
            Err(e) => {
                any_errors = true;
                eprintln!("caplint: {}: {e}", file.display());
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&all_issues)?);
    } else {
        print!("{}", render::render_issues(&all_issues));
        println!("{}", render::render_summary(&all_issues));
    }
    Ok(exit_for(any_errors))
}

fn run_lint(
    mut analyzer: Analyzer,
    paths: &[PathBuf],
    fix: bool,
    fix_only: &[String],
    disable: &[String],
    json: bool,
) -> Result<ExitCode, Error> {
    analyzer = analyzer.with_rule_filters(fix_only, disable);
    for id in analyzer.unknown_rule_ids() {
        eprintln!("caplint: unknown rule id `{id}` ignored");
    }

    let files = expand_paths(paths);
    let mut any_errors = false;
    let mut all_issues = Vec::new();

    for file in &files {
        let bytes = std::fs::read(file)?;
        if fix {
            match analyzer.lint_fix(file, bytes.clone()) {
                Ok(report) => {
                    if report.new_bytes.as_bytes() != bytes.as_slice() {
                        std::fs::write(file, &report.new_bytes)?;
                        eprintln!(
                            "fixed {} ({} passes, rules: {})",
                            file.display(),
                            report.passes_used,
                            report.applied_rule_ids.join(", ")
                        );
                    }
                    any_errors |= report
                        .remaining_issues
                        .iter()
                        .any(|i| i.severity == Severity::Error);
                    all_issues.extend(report.remaining_issues);
                }
                Err(e) => {
                    any_errors = true;
                    eprintln!("caplint: {}: {e}", file.display());
                }
            }
        } else {
            match analyzer.analyze(file, bytes) {
                Ok(report) => {
                    any_errors |= report.has_errors();
                    all_issues.extend(report.issues);
                }
                Err(e) => {
                    any_errors = true;
                    eprintln!("caplint: {}: {e}", file.display());
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&all_issues)?);
    } else {
        print!("{}", render::render_issues(&all_issues));
        println!("{}", render::render_summary(&all_issues));
    }
    Ok(exit_for(any_errors))
}

fn run_format(analyzer: &Analyzer, paths: &[PathBuf], check: bool) -> Result<ExitCode, Error> {
    let files = expand_paths(paths);
    let mut any_changed = false;

    for file in &files {
        let bytes = std::fs::read(file)?;
        match analyzer.format(file, bytes, check) {
            Ok(report) => {
                for violation in &report.violations {
                    eprintln!("{}: {violation}", file.display());
                }
                if report.changed {
                    any_changed = true;
                    if check {
                        println!("would reformat {}", file.display());
                    } else if let Some(new_bytes) = &report.new_bytes {
                        std::fs::write(file, new_bytes)?;
                        println!("reformatted {}", file.display());
                    }
                }
            }
            Err(e) => {
                eprintln!("caplint: {}: {e}", file.display());
                return Ok(ExitCode::from(2));
            }
        }
    }

    if check {
        Ok(exit_for(any_changed))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn exit_for(failed: bool) -> ExitCode {
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
