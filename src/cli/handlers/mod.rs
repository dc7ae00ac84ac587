mod serve;
pub use serve::cmd_serve;

use std::io::Read;

use regex::Regex;
use serde::Serialize;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::clickup::ClickUpClient;
use crate::io::config::load_config;
use crate::io::store::Store;
use crate::model::config::AppConfig;
use crate::ops::dashboard::{DashboardInput, build_dashboard};
use crate::ops::history::build_report;
use crate::ops::overview::build_overview;
use crate::ops::signing::LinkSigner;
use crate::ops::status::{Clock, FixedClock, SystemClock};
use crate::ops::sync::Syncer;
use crate::parse::history_import::parse_history;
use crate::util::dates::{parse_ymd, utc_now_rfc3339};
use crate::web::LinkResponse;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let json = cli.json;
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => cmd_serve(config, args),

        // Task tracker
        Commands::Sync => cmd_sync(&config, json),
        Commands::Refresh(args) => cmd_refresh(&config, args, json),

        // Read commands
        Commands::Link(args) => cmd_link(&config, args, json),
        Commands::Show(args) => cmd_show(&config, args, json),
        Commands::Projects(args) => cmd_projects(&config, args, json),
        Commands::History(args) => cmd_history(&config, args, json),
        Commands::Edits(args) => cmd_edits(&config, args, json),

        // Write commands
        Commands::ImportHistory(args) => cmd_import_history(&config, args, json),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_store(config: &AppConfig) -> Result<Store, Box<dyn std::error::Error>> {
    Ok(Store::open(&config.server.database_path)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_sync(config: &AppConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let source = ClickUpClient::new(&config.clickup.api_token)?;
    let total = Syncer::new(&source, &store, config).refresh_all()?;
    if json {
        print_json(&SyncJson { synced_clients: total })?;
    } else {
        println!("synced {} clients", total);
    }
    Ok(())
}

fn cmd_refresh(config: &AppConfig, args: SfIdArg, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let source = ClickUpClient::new(&config.clickup.api_token)?;
    let refreshed = Syncer::new(&source, &store, config).refresh_client(&args.sf_id)?;
    if json {
        print_json(&RefreshJson {
            sf_id: args.sf_id,
            refreshed,
        })?;
    } else if refreshed {
        println!("refreshed {}", args.sf_id);
    } else {
        return Err(format!("no stored client '{}' (run `sb sync` first)", args.sf_id).into());
    }
    Ok(())
}

fn cmd_link(config: &AppConfig, args: SfIdArg, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let signer = LinkSigner::new(&config.auth.client_link_secret)?;
    if json {
        print_json(&LinkResponse {
            signature: signer.sign(&args.sf_id),
            url_path: signer.status_path(&args.sf_id),
            sf_id: args.sf_id,
        })?;
    } else {
        println!("{}", signer.status_path(&args.sf_id));
    }
    Ok(())
}

fn cmd_show(config: &AppConfig, args: ShowArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let clock: Box<dyn Clock> = match args.today.as_deref() {
        Some(raw) => {
            let date = parse_ymd(raw).ok_or_else(|| format!("invalid --today '{}' (expected YYYY-MM-DD)", raw))?;
            Box::new(FixedClock(date))
        }
        None => Box::new(SystemClock),
    };

    let store = open_store(config)?;
    if args.refresh {
        let source = ClickUpClient::new(&config.clickup.api_token)?;
        if let Err(e) = Syncer::new(&source, &store, config).refresh_client(&args.sf_id) {
            tracing::warn!(sf_id = %args.sf_id, error = %e, "refresh failed, showing cached data");
        }
    }

    let status = store
        .get_client_status(&args.sf_id)?
        .ok_or_else(|| format!("no client with sf_id '{}'", args.sf_id))?;
    let overrides = store.client_overrides(&args.sf_id)?;
    let view = build_dashboard(DashboardInput {
        status: &status,
        overrides: &overrides,
        field_map: &config.field_map,
        can_edit: false,
        today: clock.today(),
    });

    if json {
        print_json(&ShowJson {
            sf_id: &status.sf_id,
            task_name: &status.task_name,
            dashboard: &view,
        })?;
    } else {
        print_lines(&format_dashboard(status.display_name(), &status.sf_id, &view));
    }
    Ok(())
}

fn cmd_projects(config: &AppConfig, args: ProjectsArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = args
        .grep
        .as_deref()
        .map(|p| Regex::new(p).map_err(|e| format!("invalid regex '{}': {}", p, e)))
        .transpose()?;

    let store = open_store(config)?;
    if args.refresh {
        let source = ClickUpClient::new(&config.clickup.api_token)?;
        if let Err(e) = Syncer::new(&source, &store, config).refresh_all() {
            tracing::warn!(error = %e, "refresh failed, listing cached data");
        }
    }

    let signer = LinkSigner::new(&config.auth.client_link_secret)?;
    let statuses = store.list_client_statuses()?;
    let overview = build_overview(&statuses, &signer, &config.auth.admin_api_key, filter.as_ref());
    if json {
        print_json(&overview)?;
    } else {
        print_lines(&format_overview(&overview));
    }
    Ok(())
}

fn cmd_import_history(
    config: &AppConfig,
    args: ImportHistoryArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = if args.file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.file)
            .map_err(|e| format!("cannot read {}: {}", args.file.display(), e))?
    };

    let outcome = parse_history(&text, &utc_now_rfc3339())?;
    let store = open_store(config)?;
    let inserted = store.upsert_historical_metrics(&outcome.rows)?;
    tracing::info!(parsed = outcome.rows.len(), inserted, "imported historical metrics");

    if json {
        print_json(&ImportJson {
            parsed: outcome.rows.len(),
            inserted,
            skipped: outcome.skipped,
            delimiter: outcome.delimiter,
        })?;
    } else {
        println!(
            "parsed {} rows ({} new, {} skipped, {}-delimited)",
            outcome.rows.len(),
            inserted,
            outcome.skipped,
            outcome.delimiter
        );
    }
    Ok(())
}

fn cmd_history(config: &AppConfig, args: HistoryArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let statuses = store.list_client_statuses()?;
    let historical = store.list_historical_metrics()?;
    let report = build_report(&statuses, &historical);
    if json {
        print_json(&report)?;
    } else {
        print_lines(&format_report(&report, args.records));
    }
    Ok(())
}

fn cmd_edits(config: &AppConfig, args: SfIdArg, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let entries = store.list_edit_log(&args.sf_id)?;
    if json {
        print_json(&entries)?;
    } else if entries.is_empty() {
        println!("no edits for {}", args.sf_id);
    } else {
        print_lines(&format_edit_log(&entries));
    }
    Ok(())
}
