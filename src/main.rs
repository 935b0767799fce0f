use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use placement_mis::db::{self, PgStore};
use placement_mis::models::{format_number, EditLogFilter};
use placement_mis::{report, Engine, RosterSchema, Settings};

#[derive(Parser)]
#[command(name = "placement-mis")]
#[command(about = "Placement roster tracker: MIS ingestion, edits, versions and analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Reconcile an MIS spreadsheet (CSV) into the roster
    Ingest {
        #[arg(long)]
        file: PathBuf,
        /// Name recorded on the upload version; defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Print placement analytics
    Analytics {
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown placement report
    Report {
        #[arg(long, default_value = "placement-report.md")]
        out: PathBuf,
    },
    /// List upload versions, newest first
    Versions,
    /// Print the rows captured by one upload version
    VersionShow {
        version_id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Delete an upload version and its snapshot
    VersionDelete { version_id: i64 },
    /// Set one field on a student
    Edit {
        reg_no: String,
        field: String,
        value: String,
    },
    /// Set several fields on a student at once
    EditMany {
        reg_no: String,
        /// field=value, repeatable
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Browse the edit log
    EditLog {
        #[arg(long)]
        reg_no: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        page_size: u32,
    },
    /// Remove one student from the roster
    DeleteStudent { reg_no: String },
    /// Remove every student from the roster
    DropAll {
        #[arg(long)]
        yes: bool,
    },
}

fn split_assignment(raw: &str) -> anyhow::Result<(String, String)> {
    let Some((field, value)) = raw.split_once('=') else {
        bail!("expected FIELD=VALUE, got `{raw}`");
    };
    Ok((field.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("PLACEMENT_MIS_LOG")
        .unwrap_or_else(|_| EnvFilter::new("placement_mis=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let pool = db::connect(&settings)
        .await
        .context("failed to connect to Postgres")?;

    if let Commands::InitDb = cli.command {
        db::init_db(&pool).await?;
        println!("Schema ready.");
        return Ok(());
    }

    let engine = Engine::new(PgStore::new(pool), RosterSchema::default());

    match cli.command {
        Commands::InitDb => {}
        Commands::Ingest { file, name } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let name = name.unwrap_or_else(|| {
                file.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string())
            });
            let outcome = engine.ingest(&bytes, &name).await?;
            println!(
                "{} rows: {} inserted, {} updated, {} unchanged ({} skipped, {} duplicates).",
                outcome.records_total,
                outcome.inserted,
                outcome.updated,
                outcome.unchanged,
                outcome.skipped,
                outcome.duplicates
            );
            match (outcome.version_id, &outcome.version_error) {
                (Some(id), _) => println!("Recorded version {id}."),
                (None, Some(error)) => println!("Roster updated but the version was not saved: {error}"),
                (None, None) => println!("No changes; no version recorded."),
            }
        }
        Commands::Analytics { json } => {
            let cached = engine.get_analytics().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&cached)?);
                return Ok(());
            }
            let bundle = &cached.bundle;
            println!("Students: {}", bundle.total_students);
            println!(
                "Placed {} of {} eligible ({:.1}%)",
                bundle.placed, bundle.eligible, bundle.placement_rate
            );
            if bundle.compensation.count > 0 {
                println!(
                    "CTC mean {} median {} max {}",
                    format_number(bundle.compensation.mean),
                    format_number(bundle.compensation.median),
                    format_number(bundle.compensation.max)
                );
            }
            for dept in &bundle.by_department {
                println!("- {}: {} / {} placed", dept.name, dept.placed, dept.eligible);
            }
        }
        Commands::Report { out } => {
            let cached = engine.get_analytics().await?;
            std::fs::write(&out, report::build_report(&cached))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Versions => {
            let versions = engine.list_versions().await?;
            if versions.is_empty() {
                println!("No versions recorded.");
                return Ok(());
            }
            for version in versions {
                println!(
                    "- #{} {} at {}: {} rows, {} inserted, {} updated",
                    version.version_id,
                    version.filename,
                    version.uploaded_at.format("%Y-%m-%d %H:%M"),
                    version.total_records,
                    version.inserted,
                    version.updated
                );
            }
        }
        Commands::VersionShow { version_id, json } => {
            let snapshot = engine.get_version_snapshot(version_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
                return Ok(());
            }
            println!(
                "Version #{} ({}), {} rows:",
                snapshot.version.version_id,
                snapshot.version.filename,
                snapshot.rows.len()
            );
            for row in &snapshot.rows {
                println!(
                    "- {} {} [{}]",
                    row.reg_no,
                    row.student_name.as_deref().unwrap_or(""),
                    row.status.as_deref().unwrap_or("")
                );
            }
        }
        Commands::VersionDelete { version_id } => {
            engine.delete_version(version_id).await?;
            println!("Version {version_id} deleted.");
        }
        Commands::Edit { reg_no, field, value } => {
            if engine.apply_field_edit(&reg_no, &field, &value).await? {
                println!("Updated {field} for {reg_no}.");
            } else {
                println!("{field} for {reg_no} already had that value.");
            }
        }
        Commands::EditMany { reg_no, set } => {
            let values = set
                .iter()
                .map(|raw| split_assignment(raw))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let changed = engine.apply_bulk_field_edit(&reg_no, &values).await?;
            if changed.is_empty() {
                println!("No fields changed for {reg_no}.");
            } else {
                println!("Updated {} for {reg_no}.", changed.join(", "));
            }
        }
        Commands::EditLog {
            reg_no,
            page,
            page_size,
        } => {
            let filter = EditLogFilter {
                reg_no,
                ..Default::default()
            };
            let listing = engine.list_edit_log(&filter, page, page_size).await?;
            println!(
                "Page {} ({} per page), {} entries total:",
                listing.page, listing.page_size, listing.total
            );
            for entry in &listing.entries {
                println!(
                    "- {} {} {}: {} -> {}",
                    entry.changed_at.format("%Y-%m-%d %H:%M"),
                    entry.reg_no,
                    entry.field,
                    entry.old_value.as_deref().unwrap_or("(empty)"),
                    entry.new_value.as_deref().unwrap_or("(empty)")
                );
            }
        }
        Commands::DeleteStudent { reg_no } => {
            engine.delete_student(&reg_no).await?;
            println!("Student {reg_no} deleted.");
        }
        Commands::DropAll { yes } => {
            if !yes {
                bail!("refusing to clear the roster without --yes");
            }
            let removed = engine.drop_all().await?;
            println!("Removed {removed} students.");
        }
    }

    Ok(())
}
