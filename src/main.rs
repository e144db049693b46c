use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use odoo_migrator::{migrate_module, steps_between, ModuleDir, ModuleReport};
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "odoo-migrator")]
#[command(about = "Source-level migration tool for Odoo modules", long_about = None)]
#[command(version)]
struct Cli {
    /// Module directories to migrate
    #[arg(required = true)]
    modules: Vec<PathBuf>,

    /// Version to migrate from (e.g. 16.0)
    #[arg(long = "from", value_name = "VERSION")]
    from: String,

    /// Version to migrate to (defaults to the latest supported)
    #[arg(long = "to", value_name = "VERSION", default_value_t = odoo_migrator::steps::latest_target().to_string())]
    to: String,

    /// Show unified diffs of changed files
    #[arg(short, long)]
    diff: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let steps = steps_between(&cli.from, &cli.to)?;

    println!(
        "Migrating {} module(s): {}",
        cli.modules.len(),
        steps
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();

    let mut total_changed = 0;
    let mut total_failed = 0;

    // One bad module never stops the batch; report and move on.
    for path in &cli.modules {
        match run_module(path, &steps, cli.diff) {
            Ok(report) => {
                total_changed += report.files_changed();
                total_failed += report.failures();
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), path.display(), e);
                total_failed += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} files changed", format!("{total_changed}").green());
    println!("  {} failures", format!("{total_failed}").red());

    if total_failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_module(
    path: &Path,
    steps: &[odoo_migrator::MigrationStep],
    diff: bool,
) -> Result<ModuleReport> {
    let module = ModuleDir::open(path)?;
    let report = migrate_module(&module, steps)?;

    println!("{} ({})", module.name().bold(), path.display());
    for step in &report.steps {
        if step.changed.is_empty() && step.failed.is_empty() && step.ops_applied.is_empty() {
            continue;
        }
        println!("  {}", step.step.name().dimmed());
        for change in &step.changed {
            println!(
                "    {} {}",
                "✓".green(),
                relative(&change.path, module.root()).display()
            );
            if diff {
                display_diff(&change.path, &change.before, &change.after);
            }
        }
        for op in &step.ops_applied {
            println!("    {} {}", "✓".green(), op);
        }
        for failure in &step.failed {
            eprintln!(
                "    {} {}: {} ({})",
                "✗".red(),
                relative(&failure.path, module.root()).display(),
                failure.message,
                failure.construct.dimmed()
            );
        }
    }
    Ok(report)
}

fn relative<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (migrated)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
    println!();
}
