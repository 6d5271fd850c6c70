use anilog::aggregate::Scope;
use anilog::auth::{self, AuthClient, SessionProvider};
use anilog::catalog::{CatalogClient, GuardedCatalog, SearchOutcome};
use anilog::config::Configuration;
use anilog::error::AppError;
use anilog::http::HttpClient;
use anilog::models::{EntryUpdate, ListDraft, Theme, WatchStatus};
use anilog::output;
use anilog::realtime::{self, ChangeFeed, Collection};
use anilog::store::{EntryOrder, SupabaseStore};
use anilog::tracker::{self, Tracker};
use anilog::view;
use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account with the configured credentials
    Signup,
    /// Show the signed-in account
    Whoami,
    /// Revoke the configured account's session
    Logout,
    /// Search the anime catalog
    Search {
        query: String,
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Currently airing top anime
    Trending {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Show your watchlist grouped by status
    List {
        /// `updated` (last edited first) or `added`
        #[arg(long, default_value = "updated")]
        sort: EntryOrder,
    },
    /// Add an anime by its MyAnimeList id
    Add {
        id: i64,
        #[arg(short, long, default_value = "watch_later")]
        status: WatchStatus,
    },
    /// Edit a watchlist entry
    Update {
        entry_id: String,
        #[arg(long)]
        status: Option<WatchStatus>,
        #[arg(long)]
        episodes: Option<i32>,
        /// 0 clears the rating
        #[arg(long)]
        rating: Option<i32>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove a watchlist entry
    Remove { entry_id: String },
    /// Profile statistics
    Stats,
    /// Estimate time left: `all`, `watching`, or an entry id
    Binge {
        #[arg(default_value = "all")]
        scope: String,
        /// Minutes per episode: 24 (Standard), 12 (Short), 45 (Long) or any other length
        #[arg(long)]
        length: Option<u32>,
    },
    /// Plan a watch session for an entry
    Schedule { entry_id: String, date: NaiveDate },
    /// Show or change the theme
    Theme { name: Option<Theme> },
    /// Keep the watchlist on screen and refresh it on every change
    Watch,
    /// Custom watchlists
    Lists {
        #[command(subcommand)]
        command: ListsCommand,
    },
    /// Open a shared list by its token
    Shared { token: String },
}

#[derive(Subcommand)]
enum ListsCommand {
    Ls,
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        public: bool,
    },
    Edit {
        list_id: String,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        public: bool,
    },
    Delete { list_id: String },
    Show { list_id: String },
    Add {
        list_id: String,
        id: i64,
        #[arg(short, long)]
        notes: Option<String>,
    },
    Remove { item_id: String },
    Share { list_id: String },
}

struct App {
    config: Configuration,
    auth: AuthClient,
    catalog: Arc<CatalogClient>,
    browse: GuardedCatalog,
    tracker: Tracker<SupabaseStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .init();

    debug!("Starting anilog v{}", env!("CARGO_PKG_VERSION"));

    let config = Configuration::from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    let http_client = HttpClient::new()?;
    let auth = AuthClient::new(http_client.clone(), config.backend_url(), &config.backend.anon_key);
    let store = Arc::new(SupabaseStore::new(
        http_client.clone(),
        config.backend_url(),
        &config.backend.anon_key,
    ));
    let catalog = Arc::new(CatalogClient::new(http_client, config.catalog_url()));
    let browse = GuardedCatalog::new(Arc::clone(&catalog));
    let tracker = Tracker::new(store, SessionProvider::default(), ChangeFeed::default());

    let app = App { config, auth, catalog, browse, tracker };

    if let Err(e) = run(&app, cli.command).await {
        error!("Command failed: {}", e);
        if let Some(app_err) = e.downcast_ref::<AppError>() {
            eprintln!("{}", app_err.notice());
            if app_err.is_retryable() {
                eprintln!("(try again in a moment)");
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn sign_in(app: &App) -> Result<()> {
    let Some(credentials) = app.config.credentials() else {
        debug!("No credentials configured, continuing signed out");
        return Ok(());
    };
    let session = app
        .auth
        .sign_in_with_password(&credentials.email, &credentials.password)
        .await?;
    info!("Signed in as {}", session.user.email.as_deref().unwrap_or(&session.user.id));
    app.tracker.sessions().set(Some(session));
    Ok(())
}

async fn run(app: &App, command: Command) -> Result<()> {
    if let Command::Signup = command {
        let credentials = app.config.credentials().ok_or_else(|| {
            AppError::Validation("Set account.email and account.password first".to_string())
        })?;
        match app.auth.sign_up(&credentials.email, &credentials.password).await? {
            Some(_) => println!("Account created. You're signed in!"),
            None => println!("Check your email to confirm your account!"),
        }
        return Ok(());
    }

    sign_in(app).await?;
    let refresher = auth::spawn_refresher(app.tracker.sessions().clone(), app.auth.clone());

    let result = dispatch(app, command).await;

    refresher.abort();
    result
}

async fn dispatch(app: &App, command: Command) -> Result<()> {
    let tracker = &app.tracker;

    match command {
        Command::Signup => {}
        Command::Whoami => match tracker.sessions().current() {
            Some(session) => println!(
                "{} ({})",
                session.user.email.as_deref().unwrap_or("no email"),
                session.user.id
            ),
            None => println!("Not signed in"),
        },
        Command::Logout => {
            let session = tracker.sessions().require()?;
            app.auth.sign_out(&session).await?;
            tracker.sessions().set(None);
            println!("Signed out");
        }
        Command::Search { query, page } => {
            let Some(outcome) = app.browse.search(&query, page).await? else {
                return Ok(());
            };
            print_outcome(tracker, outcome, &format!("No results found for \"{}\"", query.trim())).await?;
        }
        Command::Trending { page } => {
            let Some(outcome) = app.browse.trending(page).await? else {
                return Ok(());
            };
            print_outcome(tracker, outcome, "Nothing trending right now").await?;
        }
        Command::List { sort } => {
            let entries = tracker.watchlist(sort).await?;
            println!("{}", output::render_buckets(&view::group_by_status(&entries)));
        }
        Command::Add { id, status } => {
            let media = app.catalog.get_anime(id).await?;
            let entry = tracker.add(&media, status).await?;
            println!("Added {} to {}!", entry.title, entry.status);
        }
        Command::Update { entry_id, status, episodes, rating, notes } => {
            let update = EntryUpdate { status, episodes_watched: episodes, rating, notes };
            if update.is_empty() {
                println!("Nothing to update");
                return Ok(());
            }
            let entry = tracker.update(&entry_id, &update).await?;
            println!("Updated: {}", output::entry_line(&entry));
        }
        Command::Remove { entry_id } => {
            tracker.remove(&entry_id).await?;
            println!("Removed from watchlist");
        }
        Command::Stats => {
            let stats = tracker.profile_stats().await?;
            println!("{}", output::render_stats(&stats));
        }
        Command::Binge { scope, length } => {
            let minutes = length.filter(|l| *l > 0).unwrap_or_else(|| app.config.episode_length());
            let estimate = tracker.estimate(&Scope::parse(&scope), minutes).await?;
            println!("{}", output::render_estimate(&estimate, minutes));
        }
        Command::Schedule { entry_id, date } => {
            let scheduled = tracker.schedule(&entry_id, date).await?;
            println!("Scheduled {} for {}", scheduled.title, scheduled.date.format("%B %-d, %Y"));
        }
        Command::Theme { name } => {
            let current = match name {
                Some(theme) => {
                    let theme = tracker.set_theme(theme).await?;
                    println!("Theme changed to {}!", theme.display_name());
                    theme
                }
                None => tracker.theme().await?,
            };
            println!("{}", output::render_themes(current));
        }
        Command::Watch => watch(app).await?,
        Command::Lists { command } => lists(app, command).await?,
        Command::Shared { token } => {
            let shared = tracker.shared(&token).await?;
            println!("{}", output::render_list(&shared.list, &shared.items));
        }
    }

    Ok(())
}

async fn lists(app: &App, command: ListsCommand) -> Result<()> {
    let tracker = &app.tracker;

    match command {
        ListsCommand::Ls => {
            let lists = tracker.custom_lists().await?;
            if lists.is_empty() {
                println!("No custom watchlists yet");
            }
            for list in &lists {
                println!("{}", output::list_line(list));
            }
        }
        ListsCommand::Create { name, description, public } => {
            let list = tracker
                .create_list(&ListDraft { name, description, is_public: public })
                .await?;
            println!("Created {}", output::list_line(&list));
        }
        ListsCommand::Edit { list_id, name, description, public } => {
            let list = tracker
                .update_list(&list_id, &ListDraft { name, description, is_public: public })
                .await?;
            println!("Updated {}", output::list_line(&list));
        }
        ListsCommand::Delete { list_id } => {
            tracker.delete_list(&list_id).await?;
            println!("Watchlist deleted");
        }
        ListsCommand::Show { list_id } => {
            let (list, items) = tracker.list_detail(&list_id).await?;
            println!("{}", output::render_list(&list, &items));
        }
        ListsCommand::Add { list_id, id, notes } => {
            let media = app.catalog.get_anime(id).await?;
            let item = tracker.add_to_list(&list_id, &media, notes).await?;
            println!("Added {} to the list", item.title);
        }
        ListsCommand::Remove { item_id } => {
            tracker.remove_from_list(&item_id).await?;
            println!("Removed from list");
        }
        ListsCommand::Share { list_id } => {
            let base = app.config.share_base_url.as_deref().ok_or_else(|| {
                AppError::Validation("Set shareBaseUrl to create share links".to_string())
            })?;
            let (list, _) = tracker.list_detail(&list_id).await?;
            match tracker::share_link(base, &list)? {
                Some(link) => println!("{}", link),
                None => println!("Make this list public to share it"),
            }
        }
    }

    Ok(())
}

async fn print_outcome(
    tracker: &Tracker<SupabaseStore>,
    outcome: SearchOutcome,
    empty_message: &str,
) -> Result<()> {
    match outcome {
        SearchOutcome::NoResults => println!("{}", empty_message),
        SearchOutcome::Found(page) => {
            let results = tracker.annotate_search(&page.items).await?;
            println!("{}", output::render_results(&page, &results));
        }
    }
    Ok(())
}

async fn watch(app: &App) -> Result<()> {
    let tracker = &app.tracker;
    let session = tracker.sessions().require()?;
    let mut rx = tracker.feed().subscribe();
    let poller = realtime::spawn_watchlist_poller(
        tracker.feed().clone(),
        tracker.store(),
        tracker.sessions().clone(),
        app.config.realtime_interval(),
    );

    info!("Watching for changes, press Ctrl-C to stop");
    loop {
        match tracker.watchlist(EntryOrder::RecentlyUpdated).await {
            Ok(entries) => println!("{}\n", output::render_buckets(&view::group_by_status(&entries))),
            Err(e) => warn!("Could not refresh watchlist: {}", e),
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            alive = realtime::next_invalidation(&mut rx, Collection::Watchlist, session.owner_id()) => {
                if !alive {
                    break;
                }
            }
        }
    }

    poller.abort();
    Ok(())
}
