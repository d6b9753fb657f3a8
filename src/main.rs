//! Lineage CLI - inspect merged entity views and their provenance.

use clap::{Parser, Subcommand};
use colored::Colorize;
use lineage::{
    EntityKind, LogDocument, MergedView, Origin, PlanDocument, ProfileDocument, derive_origin,
    find_candidate_directories, load_config, load_document, merge_entity,
};
use serde::Serialize;
use serde_json::json;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lineage")]
#[command(about = "Merged views and provenance for hierarchical entity documents")]
#[command(version)]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge every definition of an entity into one view
    Merge {
        /// Document kind (profile, plan, log)
        kind: String,

        /// Entity identifier
        id: String,

        /// Merge root (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show when and where an entity was first observed
    Origin {
        /// Entity identifier
        id: String,

        /// Merge root (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the directories that may define an entity, global to local
    Candidates {
        /// Entity identifier
        id: String,

        /// Start directory (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Decode documents and report parse or version failures
    Check {
        /// Document files (*.profile.json, *.plan.json, *.log.json)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn is_json(format: &str) -> bool {
    format == "json"
}

fn emit_error(format: &str, code: &str, detail: &str) -> ! {
    if is_json(format) {
        eprintln!("{}", json!({"error": code, "detail": detail}));
    } else {
        eprintln!("{}", format!("Error: {}", detail).red());
    }
    process::exit(1);
}

fn print_json<T: Serialize>(format: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{}", out),
        Err(e) => emit_error(format, "serialization_failed", &e.to_string()),
    }
}

fn resolve_root(root: Option<PathBuf>, format: &str) -> PathBuf {
    match root {
        Some(root) => root,
        None => env::current_dir()
            .unwrap_or_else(|e| emit_error(format, "no_current_dir", &e.to_string())),
    }
}

fn print_list(label: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    println!("{}", format!("{}:", label).bold());
    for value in values {
        println!("  - {}", value);
    }
}

fn print_origin(origin: &Origin) {
    match &origin.first_observed_at {
        Some(ts) => println!("{} {}", "First observed:".bold(), ts),
        None => println!("{}", "No timestamped evidence found".yellow()),
    }
    for record in &origin.provenance {
        let via = record
            .inherited_from
            .as_ref()
            .map(|slug| format!(" (via {})", slug))
            .unwrap_or_default();
        println!(
            "  {}  {:<10} {}{}",
            record.timestamp,
            record.source.to_string(),
            record.path.dimmed(),
            via
        );
    }
}

fn print_view(view: &MergedView) {
    println!(
        "{} {}",
        format!("[{}]", view.kind()).cyan(),
        view.slug().bold()
    );
    match view {
        MergedView::Profile(p) => {
            if let Some(title) = &p.title {
                println!("{}", title);
            }
            if let Some(role) = &p.role {
                println!("{} {}", "Role:".bold(), role);
            }
            print_list("Tags", &p.tags);
            print_list("Responsibilities", &p.responsibilities);
            print_list("Guardrails", &p.guardrails);
            print_list("Checklist", &p.checklist);
        }
        MergedView::Plan(p) => {
            if let Some(objective) = &p.objective {
                println!("{} {}", "Objective:".bold(), objective);
            }
            print_list("Sections", &p.sections);
            print_list("Milestones", &p.milestones);
            print_list("Backlog", &p.backlog);
            print_list("Horizon", &p.horizon);
        }
        MergedView::Log(l) => {
            print_list("Participants", &l.participants);
            println!("{}", format!("Entries: {}", l.entries.len()).bold());
            for entry in &l.entries {
                println!(
                    "  {}  {}",
                    entry.timestamp,
                    entry.title.as_deref().unwrap_or_default()
                );
            }
        }
    }
    if let Some(origin) = view.origin() {
        println!();
        print_origin(origin);
    }
}

fn kind_of(path: &Path) -> Option<EntityKind> {
    let name = path.file_name()?.to_string_lossy().to_string();
    EntityKind::ALL
        .into_iter()
        .find(|kind| name.ends_with(kind.suffix()))
}

fn check_file(path: &Path) -> Result<EntityKind, String> {
    let kind = kind_of(path).ok_or_else(|| "unrecognised document suffix".to_string())?;
    let result = match kind {
        EntityKind::Profile => load_document::<ProfileDocument>(path).map(|_| ()),
        EntityKind::Plan => load_document::<PlanDocument>(path).map(|_| ()),
        EntityKind::Log => load_document::<LogDocument>(path).map(|_| ()),
    };
    result.map(|_| kind).map_err(|e| e.to_string())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Merge {
            kind,
            id,
            root,
            format,
        } => {
            let kind: EntityKind = kind
                .parse()
                .unwrap_or_else(|e: String| emit_error(&format, "invalid_kind", &e));
            let root = resolve_root(root, &format);
            match merge_entity(kind, &id, &root) {
                Ok(view) => {
                    if is_json(&format) {
                        print_json(&format, &view);
                    } else {
                        print_view(&view);
                    }
                }
                Err(e) => emit_error(&format, "merge_failed", &e.to_string()),
            }
        }

        Commands::Origin { id, root, format } => {
            let root = resolve_root(root, &format);
            let origin = derive_origin(&id, &root);
            if is_json(&format) {
                print_json(&format, &origin);
            } else {
                print_origin(&origin);
            }
        }

        Commands::Candidates { id, root, format } => {
            let root = resolve_root(root, &format);
            let config = load_config(&root);
            let items = find_candidate_directories(&id, &root, &config);
            if is_json(&format) {
                print_json(&format, &json!({ "entity": id, "candidates": items }));
            } else if items.is_empty() {
                println!("{}", format!("No candidate directories for {}", id).yellow());
            } else {
                for item in &items {
                    println!(
                        "{:>3}  {:<16} {}",
                        item.weight,
                        item.prefix.cyan(),
                        item.entity_dir.display()
                    );
                }
            }
        }

        Commands::Check { files, format } => {
            let mut results = Vec::new();
            let mut failed = false;
            for path in &files {
                let outcome = check_file(path);
                failed |= outcome.is_err();
                if !is_json(&format) {
                    match &outcome {
                        Ok(kind) => println!("{} {} ({})", "ok".green(), path.display(), kind),
                        Err(e) => println!("{} {}: {}", "error".red(), path.display(), e),
                    }
                }
                let file = path.display().to_string();
                results.push(match outcome {
                    Ok(kind) => json!({"file": file, "kind": kind, "ok": true}),
                    Err(e) => json!({"file": file, "ok": false, "error": e}),
                });
            }
            if is_json(&format) {
                print_json(&format, &json!({ "results": results }));
            }
            if failed {
                process::exit(1);
            }
        }
    }
}
