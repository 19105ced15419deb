/// Command-line surface over the app context
use clap::{Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;

use crate::app::App;
use crate::audit::{AuditSession, CheckState, PartFilter, PartStatus, TrackingMode};
use crate::audit::{calculate_progress, Audit};
use crate::catalog::client::SEARCH_PAGE_SIZE;
use crate::catalog::types::FetchProgress;
use crate::helpers::format_relative;
use crate::store::Theme;

#[derive(Debug, Subcommand)]
pub enum Command {
  /// Validate and store a Rebrickable API key
  Setup { api_key: String },

  /// Forget the stored API key
  Logout,

  /// Search the catalog for sets
  #[command(visible_alias = "s")]
  Search {
    query: String,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = SEARCH_PAGE_SIZE)]
    page_size: u32,
  },

  /// Fetch a set and start a new audit of it
  Start {
    /// Set number, with or without variant (e.g. 75192 or 75192-1)
    set: String,
  },

  /// List saved audits, most recent first
  #[command(visible_alias = "ls")]
  List,

  /// Show an audit's parts (default: the active audit)
  Show {
    audit_id: Option<String>,
    #[arg(long, value_enum, default_value_t = PartFilter::All)]
    filter: PartFilter,
  },

  /// Make an audit the active one
  Open { audit_id: String },

  /// Set how many pieces of a part were found
  Count {
    part_id: String,
    quantity: u32,
    #[arg(long)]
    audit: Option<String>,
  },

  /// Mark all pieces of a part as found
  Check {
    part_id: String,
    #[arg(long)]
    audit: Option<String>,
  },

  /// Reset a part to nothing found
  Uncheck {
    part_id: String,
    #[arg(long)]
    audit: Option<String>,
  },

  /// Delete an audit
  #[command(visible_alias = "rm")]
  Delete { audit_id: String },

  /// Look up a part in the catalog
  Part { part_num: String },

  /// Look up a color in the catalog
  Color { color_id: i32 },

  /// Inspect or prune the set cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },

  /// Set the preferred theme
  Theme {
    #[arg(value_enum)]
    theme: ThemeArg,
  },
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
  /// Show entry counts and size
  Stats,
  /// Remove expired entries
  Clean,
  /// Remove everything
  Clear,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ThemeArg {
  Light,
  Dark,
}

impl From<ThemeArg> for Theme {
  fn from(theme: ThemeArg) -> Self {
    match theme {
      ThemeArg::Light => Theme::Light,
      ThemeArg::Dark => Theme::Dark,
    }
  }
}

/// Commands that talk to the catalog and need a key to do so
fn needs_api_key(command: &Command) -> bool {
  matches!(
    command,
    Command::Search { .. } | Command::Start { .. } | Command::Part { .. } | Command::Color { .. }
  )
}

pub async fn run(app: &mut App, command: Command) -> Result<()> {
  if app.needs_setup() && needs_api_key(&command) {
    return Err(eyre!(
      "No API key configured. Run `brickaudit setup <KEY>` or set BRICKAUDIT_API_KEY."
    ));
  }

  match command {
    Command::Setup { api_key } => {
      app.setup(&api_key).await?;
      println!("API key validated and saved.");
    }
    Command::Logout => {
      app.logout();
      println!("API key removed.");
    }
    Command::Search {
      query,
      page,
      page_size,
    } => {
      let results = app.search(&query, page, page_size).await?;
      println!("{} sets match \"{}\"", results.count, query.trim());
      for set in &results.results {
        println!(
          "  {:<12} {} ({}) - {} parts",
          set.set_num,
          set.name,
          set.year.map(|y| y.to_string()).unwrap_or_else(|| "?".into()),
          set.num_parts
        );
      }
      if results.next.is_some() {
        println!("More results: --page {}", page + 1);
      }
    }
    Command::Start { set } => {
      let audit = app.start_audit(&set, print_fetch_progress).await?;
      eprintln!();
      println!(
        "Started {} for {} {} ({} pieces in {} lines)",
        audit.id,
        audit.set_number,
        audit.set_name,
        audit.total_parts,
        audit.parts.len()
      );
    }
    Command::List => print_audit_list(app),
    Command::Show { audit_id, filter } => {
      let audit_id = audit_id.or_else(|| app.active_audit_id());
      match audit_id.and_then(|id| app.audits().get(&id)) {
        Some(audit) => print_audit(&audit, filter),
        None => {
          println!("Audit not found.");
          print_audit_list(app);
        }
      }
    }
    Command::Open { audit_id } => match app.open_audit(&audit_id) {
      Some(session) => println!("Now auditing {}", session.audit().set_name),
      None => {
        println!("Audit not found.");
        print_audit_list(app);
      }
    },
    Command::Count {
      part_id,
      quantity,
      audit,
    } => {
      let session = session_for(app, audit)?;
      let required = required_quantity(&session, &part_id)?;
      update_and_report(session, &part_id, PartStatus::counted(quantity, required))?;
    }
    Command::Check { part_id, audit } => {
      let session = session_for(app, audit)?;
      let required = required_quantity(&session, &part_id)?;
      update_and_report(session, &part_id, PartStatus::complete(required))?;
    }
    Command::Uncheck { part_id, audit } => {
      let session = session_for(app, audit)?;
      update_and_report(session, &part_id, PartStatus::default())?;
    }
    Command::Delete { audit_id } => {
      if app.audits().get(&audit_id).is_none() {
        return Err(eyre!("Audit {} not found", audit_id));
      }
      if !app.delete_audit(&audit_id) {
        return Err(eyre!("Failed to delete audit {}", audit_id));
      }
      println!("Deleted {}", audit_id);
    }
    Command::Part { part_num } => {
      let part = app.catalog().get_part(&part_num).await?;
      println!("{} {}", part.part_num, part.name);
      if let Some(url) = part.part_url {
        println!("  {}", url);
      }
    }
    Command::Color { color_id } => {
      let color = app.catalog().get_color(color_id).await?;
      println!(
        "{} {} #{}{}",
        color.id,
        color.name,
        color.rgb,
        if color.is_trans { " (transparent)" } else { "" }
      );
    }
    Command::Cache { action } => match action {
      CacheAction::Stats => {
        let stats = app.cache().stats();
        println!(
          "{} cached sets ({} expired), {} KB",
          stats.entries,
          stats.expired,
          (stats.total_size_bytes + 512) / 1024
        );
      }
      CacheAction::Clean => println!("Removed {} expired sets", app.cache().clean_expired()),
      CacheAction::Clear => {
        app.cache().clear();
        println!("Cache cleared");
      }
    },
    Command::Theme { theme } => {
      let mut preferences = app.store().preferences();
      preferences.theme = theme.into();
      if !app.store().save_preferences(&preferences) {
        return Err(eyre!("Failed to save preferences"));
      }
      println!("Theme set to {:?}", preferences.theme);
    }
  }

  Ok(())
}

fn print_fetch_progress(progress: FetchProgress) {
  eprint!(
    "\rLoading parts... {}% ({} / {})",
    progress.percentage, progress.current, progress.total
  );
  let _ = std::io::stderr().flush();
}

fn session_for(app: &App, audit_id: Option<String>) -> Result<AuditSession> {
  let audit_id = audit_id
    .or_else(|| app.active_audit_id())
    .ok_or_else(|| eyre!("No active audit. Start one or pass --audit <ID>."))?;

  app
    .open_audit(&audit_id)
    .ok_or_else(|| eyre!("Audit {} not found", audit_id))
}

fn required_quantity(session: &AuditSession, part_id: &str) -> Result<u32> {
  session
    .audit()
    .part(part_id)
    .map(|p| p.quantity)
    .ok_or_else(|| eyre!("Part {} is not part of this audit", part_id))
}

fn update_and_report(mut session: AuditSession, part_id: &str, status: PartStatus) -> Result<()> {
  let progress = session.update_part_status(part_id, status)?;
  if !session.force_save() {
    return Err(eyre!("Failed to save audit"));
  }

  let audit = session.close();
  let found = audit.status(part_id).quantity;
  println!(
    "{}: {} found. Progress {}/{} ({}%)",
    part_id, found, progress.completed, progress.total, progress.percentage
  );
  Ok(())
}

fn print_audit_list(app: &App) {
  let audits = app.audits().list();
  if audits.is_empty() {
    println!("No saved audits.");
    return;
  }

  let now = app.store().clock().now();
  let active = app.active_audit_id();
  for audit in audits {
    let marker = if active.as_deref() == Some(audit.id.as_str()) {
      "*"
    } else {
      " "
    };
    println!(
      "{} {}  {} {}  {}% - updated {}",
      marker,
      audit.id,
      audit.set_number,
      audit.set_name,
      audit.progress.percentage,
      format_relative(audit.last_modified, now)
    );
  }
}

fn print_audit(audit: &Audit, filter: PartFilter) {
  let lines = calculate_progress(&audit.parts, &audit.parts_status, TrackingMode::Checkbox);
  println!(
    "{} {} ({}), theme {}",
    audit.set_number,
    audit.set_name,
    audit
      .set_year
      .map(|y| y.to_string())
      .unwrap_or_else(|| "?".into()),
    audit.theme
  );
  println!(
    "{} published parts, {} pieces incl. spares",
    audit.published_part_count, audit.total_parts
  );
  println!(
    "Pieces {}/{} ({}%), lines {}/{}",
    audit.progress.completed,
    audit.progress.total,
    audit.progress.percentage,
    lines.completed,
    lines.total
  );

  for part in &audit.parts {
    let state = audit.check_state(part);
    if !filter.matches(state) {
      continue;
    }
    let mark = match state {
      CheckState::Unchecked => "[ ]",
      CheckState::Partial => "[~]",
      CheckState::Complete => "[x]",
    };
    let color = part.color.as_ref().map(|c| c.name.as_str()).unwrap_or("-");
    println!(
      "{} {:<24} {:>3}/{:<3} {}, {}{}",
      mark,
      part.id,
      audit.status(&part.id).quantity,
      part.quantity,
      part.name(),
      color,
      if part.is_spare { " (spare)" } else { "" }
    );
  }
}
