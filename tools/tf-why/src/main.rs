//! tf-why: explain a Terraform plan in plain language, with risk tiers.
//!
//! Usage:
//!   terraform show -json plan.out | tf-why
//!   tf-why --plan plan.json --format json
//!   tf-why --plan plan.json --ci --fail-on medium   # exit 10/20/30/40 at or above the threshold
//!
//! Diagnostics and logs go to stderr; stdout carries only the report.

use std::error::Error;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use plan_risk::types::Report;
use plan_risk::{Classification, Config, Engine, RuleSet, Tier};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
  Text,
  Json,
}

#[derive(Debug, Parser)]
#[command(name = "tf-why", version, about = "Explain Terraform plan changes with risk scoring")]
struct Cli {
  /// Plan JSON from `terraform show -json` (default: stdin)
  #[arg(long)]
  plan: Option<PathBuf>,

  #[arg(long, value_enum, default_value_t = Format::Text)]
  format: Format,

  /// Set the exit code from the overall risk tier
  #[arg(long)]
  ci: bool,

  /// Lowest tier that fails in CI mode: low, medium, high or critical
  #[arg(long, default_value = "high", value_parser = parse_tier)]
  fail_on: Tier,

  /// Comma-separated resource types to evaluate
  #[arg(long, value_delimiter = ',')]
  only: Vec<String>,

  /// Comma-separated signal tags to ignore (e.g. security,ops)
  #[arg(long, value_delimiter = ',')]
  exclude_tag: Vec<String>,

  /// Number of highest-risk resources named in the summary
  #[arg(long, default_value_t = 5)]
  top: usize,

  /// Maximum resource explanations in the report, highest risk first
  #[arg(long, default_value_t = 20)]
  max_findings: usize,

  /// Worker threads for rule evaluation (0 = all cores)
  #[arg(long, default_value_t = 0, env = "TF_WHY_JOBS")]
  jobs: usize,

  /// Production-critical address or module prefix (repeatable)
  #[arg(long)]
  critical: Vec<String>,

  /// Debug logging on stderr
  #[arg(short, long)]
  verbose: bool,
}

fn parse_tier(s: &str) -> Result<Tier, String> {
  match Tier::from_str_loose(s) {
    Some(Tier::None) | None => Err(format!("expected low, medium, high or critical, got {:?}", s)),
    Some(t) => Ok(t),
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match run(&cli) {
    Ok(code) => ExitCode::from(code),
    Err(e) => {
      eprintln!("tf-why: {}", e);
      ExitCode::from(1)
    }
  }
}

fn init_logging(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(io::stderr)
    .init();
}

fn run(cli: &Cli) -> Result<u8, Box<dyn Error>> {
  let input = read_input(cli.plan.as_ref())?;

  let config = Config {
    top_n: cli.top,
    max_explanations: cli.max_findings,
    jobs: cli.jobs,
    only_types: clean(&cli.only),
    exclude_tags: clean(&cli.exclude_tag),
    ..Config::default()
  };
  let classification = cli
    .critical
    .iter()
    .fold(Classification::new(), |c, entry| c.with_critical(entry.trim()));

  let engine = Engine::new(config, RuleSet::builtin());
  let report = engine.analyze_str(&input, &classification)?;
  debug!(report_id = %report.report_id, "analysis complete");

  let stdout = io::stdout();
  let mut out = io::BufWriter::new(stdout.lock());
  match cli.format {
    Format::Json => {
      serde_json::to_writer_pretty(&mut out, &report)?;
      writeln!(out)?;
    }
    Format::Text => write_text(&mut out, &report)?,
  }
  out.flush()?;

  Ok(if cli.ci {
    exit_code(report.verdict.overall, cli.fail_on)
  } else {
    0
  })
}

fn read_input(path: Option<&PathBuf>) -> Result<String, Box<dyn Error>> {
  match path {
    Some(p) if p.as_os_str() != "-" => {
      fs::read_to_string(p).map_err(|e| format!("cannot read {}: {}", p.display(), e).into())
    }
    _ => {
      let mut buf = String::new();
      io::stdin().read_to_string(&mut buf)?;
      Ok(buf)
    }
  }
}

fn clean(values: &[String]) -> Vec<String> {
  values
    .iter()
    .map(|v| v.trim())
    .filter(|v| !v.is_empty())
    .map(String::from)
    .collect()
}

/// 0 below the threshold, otherwise 10/20/30/40 for low/medium/high/critical.
fn exit_code(overall: Tier, fail_on: Tier) -> u8 {
  if overall < fail_on {
    return 0;
  }
  match overall {
    Tier::None => 0,
    Tier::Low => 10,
    Tier::Medium => 20,
    Tier::High => 30,
    Tier::Critical => 40,
  }
}

fn write_text(out: &mut impl Write, report: &Report) -> io::Result<()> {
  writeln!(out, "{}", report.summary.sentence)?;

  for e in report.explanations.iter().filter(|e| !e.bullets.is_empty()) {
    writeln!(out)?;
    writeln!(out, "{}", e.headline)?;
    for bullet in &e.bullets {
      writeln!(out, "  - {}", bullet)?;
    }
    for detail in &e.details {
      writeln!(out, "      {}", detail)?;
    }
    if !e.tags.is_empty() {
      writeln!(out, "  tags: {}", e.tags.join(", "))?;
    }
    for rec in &e.recommendations {
      writeln!(out, "  > {}", rec)?;
    }
  }

  if !report.diagnostics.is_empty() {
    writeln!(out)?;
    writeln!(out, "Diagnostics:")?;
    for d in &report.diagnostics {
      writeln!(out, "  ! {}", d.message)?;
    }
  }
  Ok(())
}
