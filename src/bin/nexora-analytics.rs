use clap::{Parser, Subcommand};

use nexora_analytics::{NexoraAnalytics, ReportRange, Role};

#[derive(Parser)]
#[command(name = "nexora-analytics", about = "Nexora analytics and reporting CLI")]
struct Cli {
    /// Database path (default: ~/.nexora-analytics/nexora.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a document-database snapshot (JSON) into the local store
    Import {
        /// Path to the snapshot file
        file: String,
    },
    /// Compute analytics reports
    Report {
        #[command(subcommand)]
        target: ReportTarget,
    },
    /// Render a report as a downloadable artifact
    Export {
        #[command(subcommand)]
        target: ReportTarget,
        /// Output directory for the rendered document
        #[arg(long, default_value = ".")]
        out: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show store contents
    Status,
}

#[derive(Subcommand)]
enum ReportTarget {
    /// Cross-facility dashboard for the requesting identity
    Global {
        /// Requesting identity (user id, auth uid, or email; default: `identity` config)
        #[arg(long)]
        identity: Option<String>,
        /// Role claim: owner, manager, member, guest
        #[arg(long)]
        role: Option<String>,
        /// Range token: 1w, 2w, 4w, 8w, 12w
        #[arg(long, default_value = "4w")]
        range: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Single-facility report
    Facility {
        /// Facility id
        facility_id: String,
        #[arg(long)]
        identity: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long, default_value = "4w")]
        range: String,
        #[arg(long)]
        json: bool,
    },
    /// Per-member report
    Member {
        /// Member id (user id, auth uid, or email)
        member_id: String,
        /// Scope the lookup to one facility
        #[arg(long)]
        facility: Option<String>,
        #[arg(long)]
        identity: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long, default_value = "4w")]
        range: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
}

/// Resolve the requesting identity: an explicit flag wins, else the stored
/// `identity` config key.
async fn require_identity(
    hub: &NexoraAnalytics,
    flag: Option<String>,
) -> anyhow::Result<String> {
    if let Some(identity) = flag {
        return Ok(identity);
    }
    hub.config_get("identity").await?.ok_or_else(|| {
        anyhow::anyhow!(
            "No identity given. Pass --identity or run 'nexora-analytics config set identity <id>'."
        )
    })
}

async fn resolve_role(hub: &NexoraAnalytics, flag: Option<String>) -> anyhow::Result<Role> {
    let claim = match flag {
        Some(r) => Some(r),
        None => hub.config_get("role").await?,
    };
    Ok(claim.as_deref().map(Role::parse).unwrap_or(Role::Member))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => nexora_analytics::Database::open_at(path).await?,
        None => nexora_analytics::Database::open().await?,
    };
    let hub = NexoraAnalytics::new(db);

    match cli.command {
        Commands::Import { file } => {
            let report = hub.import_snapshot(&file).await?;
            print_import_report(&report);
        }
        Commands::Report { target } => {
            handle_report(&hub, target).await?;
        }
        Commands::Export { target, out } => {
            handle_export(&hub, target, &out).await?;
        }
        Commands::Config { action } => {
            handle_config(&hub, action).await?;
        }
        Commands::Status => {
            let counts = hub.status().await?;
            println!("Store Status");
            println!("  Facilities:  {}", counts.facilities);
            println!("  Users:       {}", counts.users);
            println!("  Memberships: {}", counts.memberships);
            println!("  Projects:    {}", counts.projects);
            println!("  Tasks:       {}", counts.tasks);
        }
    }

    Ok(())
}

async fn handle_report(hub: &NexoraAnalytics, target: ReportTarget) -> anyhow::Result<()> {
    match target {
        ReportTarget::Global {
            identity,
            role,
            range,
            json,
        } => {
            let identity = require_identity(hub, identity).await?;
            let role = resolve_role(hub, role).await?;
            let range = ReportRange::parse(&range)?;
            let report = hub.global_analytics(&identity, role, range).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_global_report(&report);
            }
        }
        ReportTarget::Facility {
            facility_id,
            identity,
            role,
            range,
            json,
        } => {
            let identity = require_identity(hub, identity).await?;
            let role = resolve_role(hub, role).await?;
            let range = ReportRange::parse(&range)?;
            let report = hub
                .facility_analytics(&facility_id, &identity, role, range)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_facility_report(&report);
            }
        }
        ReportTarget::Member {
            member_id,
            facility,
            identity,
            role,
            range,
            json,
        } => {
            let identity = require_identity(hub, identity).await?;
            let role = resolve_role(hub, role).await?;
            let range = ReportRange::parse(&range)?;
            let report = hub
                .member_analytics(&member_id, &identity, role, range, facility.as_deref())
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_member_report(&report);
            }
        }
    }
    Ok(())
}

async fn handle_export(
    hub: &NexoraAnalytics,
    target: ReportTarget,
    out: &str,
) -> anyhow::Result<()> {
    let artifact = match target {
        ReportTarget::Global {
            identity,
            role,
            range,
            ..
        } => {
            let identity = require_identity(hub, identity).await?;
            let role = resolve_role(hub, role).await?;
            let range = ReportRange::parse(&range)?;
            hub.export_global(&identity, role, range).await?
        }
        ReportTarget::Facility {
            facility_id,
            identity,
            role,
            range,
            ..
        } => {
            let identity = require_identity(hub, identity).await?;
            let role = resolve_role(hub, role).await?;
            let range = ReportRange::parse(&range)?;
            hub.export_facility(&facility_id, &identity, role, range)
                .await?
        }
        ReportTarget::Member {
            member_id,
            facility,
            identity,
            role,
            range,
            ..
        } => {
            let identity = require_identity(hub, identity).await?;
            let role = resolve_role(hub, role).await?;
            let range = ReportRange::parse(&range)?;
            hub.export_member(&member_id, &identity, role, range, facility.as_deref())
                .await?
        }
    };

    // PDF rasterization is delegated to the host; the CLI writes the
    // rendered document next to the nominal artifact name.
    let html_name = artifact.filename.replace(".pdf", ".html");
    let path = std::path::Path::new(out).join(&html_name);
    std::fs::write(&path, &artifact.html)?;

    println!("Artifact: {}", artifact.filename);
    println!("  Written: {}", path.display());
    println!("  Expires: {}", artifact.expires_at.format("%Y-%m-%d %H:%M UTC"));
    Ok(())
}

async fn handle_config(hub: &NexoraAnalytics, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match hub.config_get(&key).await? {
            Some(value) => println!("{value}"),
            None => println!("(not set)"),
        },
        ConfigAction::Set { key, value } => {
            hub.config_set(&key, &value).await?;
            println!("Set {key}");
        }
        ConfigAction::List => {
            for (key, value) in hub.config_list().await? {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}

// ── Text output ────────────────────────────────────────────────────

fn print_import_report(report: &nexora_analytics::ImportReport) {
    println!("Imported {}", report.path);
    println!("  Facilities:  {}", report.facilities);
    println!("  Users:       {}", report.users);
    println!("  Memberships: {}", report.memberships);
    println!("  Projects:    {}", report.projects);
    println!("  Tasks:       {}", report.tasks);
    if report.skipped > 0 {
        println!("  Skipped:     {} (see warnings)", report.skipped);
    }
}

fn print_insights(insights: &[nexora_analytics::Insight]) {
    println!("  Insights:");
    for insight in insights {
        println!("    [{:?}] {}", insight.kind, insight.message);
        println!("      -> {}", insight.action);
    }
}

fn print_global_report(report: &nexora_analytics::GlobalReport) {
    println!(
        "Global Analytics ({}, generated {})",
        report.meta.range,
        report.meta.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!("  Active members:      {}", report.kpis.active_members);
    println!("  Facilities:          {}", report.kpis.total_facilities);
    println!("  Avg utilization:     {:.1}%", report.kpis.avg_utilization);
    println!("  Critical facilities: {}", report.kpis.critical_facilities);
    println!("  Facilities:");
    for f in &report.facilities {
        println!(
            "    {} — {:.1}% ({:?}), {} members, {} tasks",
            f.name, f.utilization, f.status, f.member_count, f.task_count
        );
    }
    let c = &report.task_counts;
    println!(
        "  Tasks: {} done, {} in progress, {} review, {} pending, {} overdue",
        c.done, c.in_progress, c.review, c.pending, c.overdue
    );
    print_insights(&report.insights);
}

fn print_facility_report(report: &nexora_analytics::FacilityReport) {
    println!(
        "Facility Analytics: {} ({}, generated {})",
        report.facility.name,
        report.meta.range,
        report.meta.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "  Utilization: {:.1}% ({:?})",
        report.facility.utilization, report.facility.status
    );
    println!("  Members:     {}", report.kpis.active_members);
    println!("  Pending:     {}", report.kpis.pending_tasks.len());
    println!("  Overdue:     {}", report.kpis.overdue_tasks.len());
    if report.unassigned.task_count > 0 {
        println!(
            "  Unassigned:  {} tasks ({} overdue)",
            report.unassigned.task_count, report.unassigned.overdue_count
        );
    }
    println!("  Members:");
    for m in &report.members {
        println!(
            "    {} ({}) — {:.1}% ({:?}), {} tasks, trend {}%",
            m.name, m.role, m.utilization, m.status, m.total_tasks, m.trend
        );
    }
    print_insights(&report.insights);
}

fn print_member_report(report: &nexora_analytics::MemberReport) {
    println!(
        "Member Analytics: {} ({}, generated {})",
        report.member.name,
        report.meta.range,
        report.meta.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    if !report.member.resolved {
        println!("  (unresolved member id — stub record)");
    }
    println!("  Total tasks: {}", report.kpis.total_tasks);
    println!("  Completed:   {}", report.kpis.completed_tasks);
    println!("  Ongoing:     {}", report.kpis.ongoing_tasks);
    println!("  Overdue:     {}", report.kpis.overdue_tasks);
    println!("  Utilization: {:.1}%", report.kpis.utilization);
    println!("  Trend:       {}%", report.kpis.trend);
    println!("  Recent tasks:");
    for entry in &report.timeline {
        println!(
            "    {} [{}] — {}",
            entry.title,
            entry.status,
            entry.project_name.as_deref().unwrap_or(&entry.project_id)
        );
    }
    print_insights(&report.insights);
}
