use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod app;
mod backfill;
mod config;
mod db;
mod error;
mod files;
mod folders;
mod guard;
mod progress;
mod render;
mod search;
mod session;
mod sync;
#[cfg(test)]
mod testutil;
mod tui;
mod upload;
mod vocabulary;

use app::App;
use error::ApiError;
use guard::{WorkflowGuard, WorkflowKind};
use search::SearchFilters;

#[derive(Parser)]
#[command(name = "docsearch")]
#[command(about = "Search, merge and manage indexed PDF documents", long_about = None)]
struct Cli {
    /// Server base URL (saved on login)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Default)]
struct FilterArgs {
    /// Year (año)
    #[arg(long)]
    year: Option<String>,
    /// Month code, 01-12 (mes)
    #[arg(long)]
    month: Option<String>,
    /// Bank (banco)
    #[arg(long)]
    bank: Option<String>,
    /// Legal entity (razon_social)
    #[arg(long)]
    entity: Option<String>,
    /// Document type (tipo_documento)
    #[arg(long = "type")]
    document_type: Option<String>,
    /// Extra filter as name=value; repeatable
    #[arg(long = "filter", value_parser = search::parse_filter_pair)]
    extra: Vec<(String, String)>,
}

impl FilterArgs {
    fn to_filters(&self) -> SearchFilters {
        SearchFilters {
            year: self.year.clone(),
            month: self.month.clone(),
            bank: self.bank.clone(),
            legal_entity: self.entity.clone(),
            document_type: self.document_type.clone(),
            extra: self.extra.iter().cloned().collect(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and cache the filter options
    Login {
        #[arg(short, long)]
        username: Option<String>,
        /// Prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Forget the session and cached state
    Logout,
    /// Show the current user and server
    Whoami,
    /// Show the filter options
    Filters {
        /// Suggest document types matching this text
        #[arg(long)]
        types: Option<String>,
    },
    /// Search documents by metadata
    Search {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Search many ID codes at once
    Bulk {
        /// Codes separated by commas or whitespace
        #[arg(required = true)]
        codes: Vec<String>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Merge the last search results into one PDF
    Merge {
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Download a result by number, or any download URL
    Download {
        target: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// List stored files
    Files {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        search: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Delete a stored file (admin)
    Delete {
        path: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Browse remote folders
    Folders {
        path: Option<String>,
        /// Interactive picker; the choice becomes the upload folder
        #[arg(long)]
        pick: bool,
    },
    /// Create a subfolder of the current folder
    Mkdir { name: String },
    /// Upload PDF files or directories (admin)
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Destination folder; defaults to the picked folder
        #[arg(long)]
        folder: Option<String>,
        /// Leave out a file by name; repeatable
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Sync the search index with storage (admin)
    Sync {
        /// Show the first file-list page afterwards
        #[arg(long)]
        refresh_files: bool,
    },
    /// Backfill content hashes (admin, one-time)
    PopulateHashes {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsearch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let backfill_done = db::LocalState::open()
        .and_then(|state| state.backfill_done())
        .unwrap_or(false);
    let matches = command(backfill_done).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    if let Err(e) = run(cli).await {
        if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::AuthExpired)) {
            eprintln!("! session expired, run: docsearch login");
        } else {
            eprintln!("! {}", e);
        }
        std::process::exit(1);
    }
}

/// The CLI definition; `populate-hashes` drops out of help once the backfill
/// has completed but still parses for `--force`.
fn command(backfill_done: bool) -> clap::Command {
    let cmd = Cli::command();
    if backfill_done {
        cmd.mut_subcommand("populate-hashes", |sub| sub.hide(true))
    } else {
        cmd
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut app = App::open(cli.server.as_deref())?;

    match cli.command {
        Commands::Login { username, password } => login(&mut app, username, password).await?,
        Commands::Logout => {
            app.logout()?;
            println!("logged out");
        }
        Commands::Whoami => whoami(&app),
        Commands::Filters { types } => {
            app.reload_vocabulary().await?;
            match types {
                Some(input) => {
                    for suggestion in app.vocabulary().suggest_document_types(&input) {
                        println!("{}", suggestion);
                    }
                }
                None => print!("{}", render::vocabulary(app.vocabulary())),
            }
        }
        Commands::Search { filters } => {
            let filters = filters.to_filters();
            let resp = app.search(&filters).await?;
            print!(
                "{}",
                render::results(resp.total, &resp.results, filters.summary().as_deref())
            );
            if app.merge_offered()? {
                println!("merge these with: docsearch merge");
            }
        }
        Commands::Bulk { codes, filters } => {
            let codes = search::parse_codes(&codes.join(","));
            let filters = filters.to_filters();
            let resp = app.bulk_search(&codes, &filters).await?;
            print!("{}", render::bulk_summary(&resp));
            print!(
                "{}",
                render::results(resp.total, &resp.results, filters.summary().as_deref())
            );
            if app.merge_offered()? {
                println!("merge these with: docsearch merge");
            }
        }
        Commands::Merge { out } => {
            let (path, merged) = app.merge_results(&out).await?;
            println!("saved {}", path.display());
            if let Some(count) = merged.files_merged {
                println!("{} files merged", count);
            }
            if merged.merge_errors > 0 {
                println!("! {} files could not be merged", merged.merge_errors);
            }
        }
        Commands::Download { target, out } => {
            let path = match target.parse::<usize>() {
                Ok(index) => app.download_result(index, &out).await?,
                Err(_) => app.download(&target, &out).await?,
            };
            println!("saved {}", path.display());
        }
        Commands::Files {
            page,
            search,
            filters,
        } => {
            let listing = app
                .list_files(page, search.as_deref(), &filters.to_filters())
                .await?;
            print!("{}", render::files_page(&listing));
        }
        Commands::Delete { path, yes } => {
            app.require_admin()?;
            if !yes && !confirm(&format!("delete {}?", path))? {
                println!("cancelled");
                return Ok(());
            }
            app.delete_file(&path).await?;
            println!("deleted {}", path);
        }
        Commands::Folders { path, pick } => {
            if pick {
                match app.pick_folder().await? {
                    Some(folder) => println!("upload folder: /{}", folder),
                    None => println!("no folder chosen"),
                }
            } else {
                let (current, listing) = app.list_folders(path.as_deref()).await?;
                print!("{}", render::folders(&listing, &current));
            }
        }
        Commands::Mkdir { name } => {
            let path = app.create_folder(&name).await?;
            println!("created /{}", path);
        }
        Commands::Upload {
            paths,
            folder,
            exclude,
        } => upload(&mut app, &paths, folder.as_deref(), &exclude).await?,
        Commands::Sync { refresh_files } => sync(&mut app, refresh_files).await?,
        Commands::PopulateHashes { force } => populate_hashes(&mut app, force).await?,
    }

    Ok(())
}

async fn login(
    app: &mut App,
    username: Option<String>,
    password: Option<String>,
) -> anyhow::Result<()> {
    let username = match username {
        Some(u) => u,
        None => prompt("username: ")?,
    };
    let password = match password {
        Some(p) => p,
        None => rpassword::prompt_password("password: ")?,
    };
    if username.trim().is_empty() || password.is_empty() {
        anyhow::bail!("username and password are required");
    }
    let session = app.login(username.trim(), &password).await?;
    println!(
        "logged in as {} ({})",
        session.user.display_name,
        if session.is_admin() { "admin" } else { "user" }
    );
    if app.vocabulary().is_empty() {
        println!("! filter options unavailable");
    }
    Ok(())
}

fn whoami(app: &App) {
    match app.session() {
        Some(session) => {
            println!("user: {} ({})", session.user.display_name, session.user.username);
            println!("role: {}", if session.is_admin() { "admin" } else { "user" });
        }
        None => println!("not logged in"),
    }
    println!("server: {}", app.server_url().unwrap_or("(none)"));
}

async fn upload(
    app: &mut App,
    paths: &[PathBuf],
    folder: Option<&str>,
    exclude: &[String],
) -> anyhow::Result<()> {
    app.require_admin()?;
    let _guard = WorkflowGuard::acquire(WorkflowKind::Upload)?;

    let mut selection = app.select_uploads(paths)?;
    for name in exclude {
        if !selection.remove(name) {
            println!("! {} is not in the selection", name);
        }
    }
    if selection.rejected > 0 {
        println!(
            "! at most {} files per upload; {} left out",
            upload::MAX_UPLOAD_FILES,
            selection.rejected
        );
    }
    if selection.is_empty() {
        anyhow::bail!("no PDF files to upload");
    }

    let folder = app.upload_folder(folder)?;
    println!(
        "uploading {} files to /{}",
        selection.files.len(),
        folder
    );
    let batch = upload::UploadBatch::new(selection.files);
    let chunks = batch.chunk_ranges(upload::UPLOAD_CHUNK_SIZE).len();
    let bars = Arc::new(progress::UploadBars::new(&batch.files, chunks));
    let options = upload::UploadOptions {
        folder,
        ..Default::default()
    };

    let (report, page) = app.upload(&batch, &options, bars.clone()).await?;
    bars.finish();
    println!("{}", render::upload_report(&report));
    if let Some(failure) = report.failure {
        return Err(failure.into());
    }
    if let Some(page) = page {
        print!("{}", render::files_page(&page));
    }
    Ok(())
}

async fn sync(app: &mut App, refresh_files: bool) -> anyhow::Result<()> {
    app.require_admin()?;
    let _guard = WorkflowGuard::acquire(WorkflowKind::Sync)?;

    let stop = sync::StopHandle::new();
    let handle = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("stopping after the current batch...");
            handle.stop();
        }
    });

    let bar = progress::BatchBar::new("sync");
    let (report, page) = app
        .sync(sync::BATCH_DELAY, &stop, refresh_files, |n, batch, totals| {
            bar.sync_batch(n, batch, totals)
        })
        .await?;
    bar.finish();

    print!("{}", render::sync_report(&report));
    if let Some(failure) = report.failure {
        return Err(failure.into());
    }
    if let Some(page) = page {
        print!("{}", render::files_page(&page));
    }
    Ok(())
}

async fn populate_hashes(app: &mut App, force: bool) -> anyhow::Result<()> {
    app.require_admin()?;
    let _guard = WorkflowGuard::acquire(WorkflowKind::HashBackfill)?;

    let bar = progress::BatchBar::new("hashes");
    let report = app
        .populate_hashes(force, backfill::BACKFILL_DELAY, |n, batch, updated| {
            bar.hash_batch(n, batch, updated)
        })
        .await?;
    bar.finish();

    println!("{}", render::backfill_report(&report));
    if let Some(failure) = report.failure {
        return Err(failure.into());
    }
    Ok(())
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    let answer = prompt(&format!("{} [y/N] ", question))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes" | "s" | "si" | "sí"))
}
