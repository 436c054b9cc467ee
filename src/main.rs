mod app;
mod autosave;
mod case_id;
mod cli;
mod clock;
mod config;
mod domain;
mod editor;
mod keys;
mod manager;
mod repository;
mod session;
mod store;
mod ui;

use std::io::Read;
use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "CASEKEEP_LOG";
const DEFAULT_LOG_FILTER: &str = "casekeep=warn";

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn print_json(value: &impl serde::Serialize) -> Result<(), app::AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_import_source(source: &str) -> Result<String, app::AppError> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    Ok(std::fs::read_to_string(Path::new(source))?)
}

fn run() -> Result<(), app::AppError> {
    use clap::Parser;
    use cli::Commands;

    let cli = cli::Cli::parse();
    let mut config = config::Config::load(cli.config.as_deref())?;
    config.apply_overrides(cli.store, cli.namespace, cli.read_only)?;
    tracing::debug!(
        "using store {} with key prefix {}",
        config.storage.path.display(),
        config.namespace().prefix()
    );

    let mut app = app::App::open(&config)?;

    match cli.command {
        Commands::New(args) => {
            let id = app.create_case(args.initials.as_deref())?;
            println!("created {id}");
        }
        Commands::Ls(args) => {
            let cases = app.list_cases();
            if args.json {
                print_json(&cases)?;
            } else {
                ui::print_case_list(&cases);
            }
        }
        Commands::Show(args) => {
            let (meta, doc) = app.show_case(args.id.as_deref())?;
            if args.json {
                print_json(&doc)?;
            } else {
                ui::print_case(&meta, &doc);
            }
        }
        Commands::Select(args) => {
            let id = app.select_case(&args.id)?;
            println!("selected {id}");
        }
        Commands::Current => {
            let id = app.current_case_id().ok_or(app::AppError::NoCurrentCase)?;
            println!("{id}");
        }
        Commands::Set(args) => {
            let (id, _) = app.set_field(args.case_id.as_deref(), &args.pointer, &args.value)?;
            println!("updated {id} {}", args.pointer);
        }
        Commands::Rm(args) => {
            let id = app.delete_case(&args.id)?;
            println!("deleted {id}");
        }
        Commands::Dup(args) => {
            let source = app.resolve_case_id(&args.id)?;
            let copy = app.duplicate_case(&source)?;
            println!("duplicated {source} -> {copy}");
        }
        Commands::Export(args) => {
            let text = app.export_case(&args.id)?;
            match args.out {
                Some(path) => {
                    std::fs::write(&path, format!("{text}\n"))?;
                    println!("exported to {}", path.display());
                }
                None => println!("{text}"),
            }
        }
        Commands::Import(args) => {
            let text = read_import_source(&args.file)?;
            let id = app.import_case(&text)?;
            println!("imported {id}");
        }
        Commands::Usage(args) => {
            let usage = app.storage_usage();
            if args.json {
                print_json(&usage)?;
            } else {
                ui::print_usage(&usage);
            }
        }
        Commands::Clear(args) => {
            if !args.yes {
                return Err(app::AppError::InvalidArgument(
                    "refusing to delete all stored cases without --yes".to_string(),
                ));
            }
            let removed = app.clear_all_data()?;
            println!("cleared {removed} stored key(s)");
        }
        Commands::Edit(args) => {
            if let Some(raw) = args.id.as_deref() {
                app.select_case(raw)?;
            }
            if app.current_case_id().is_none() {
                return Err(app::AppError::NoCurrentCase);
            }
            let lines = editor::spawn_stdin_reader();
            let mut stdout = std::io::stdout().lock();
            editor::run_editor(app.session_mut(), &lines, &mut stdout)?;
        }
    }
    app.close()?;
    Ok(())
}
