//! Terminal front end: every screen of the app as a subcommand.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

use crate::api::models::{Category, Role, Urgency};
use crate::api::{ApiError, BiddingApi};
use crate::app::{AppState, ConfigError};
use crate::lobby::{Action, Alert, LobbyController, LobbyError, LobbySnapshot, Transcript};
use crate::registration::{RegistrationForm, WizardError};
use crate::storage::{Cache, StorageError};
use crate::ui::render;
use crate::ui::request_form::{FormError, RequestForm};
use crate::ui::request_list::{ListQuery, ListScreenConfig, Listed, StatusFilter, list_cards};

#[derive(Debug, Parser)]
#[command(name = "sala7li", version, about = "Service marketplace client")]
pub struct Cli {
    /// Settings file to use instead of the default one.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend URL for this invocation only.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Client,
    Worker,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Client => Role::Client,
            RoleArg::Worker => Role::Worker,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show or change saved settings
    Config {
        #[arg(long)]
        set_base_url: Option<String>,
        #[arg(long)]
        role: Option<RoleArg>,
        #[arg(long)]
        user_id: Option<i64>,
        /// HTTP timeout in seconds, 0 disables it
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long)]
        demo_transcript: Option<bool>,
    },
    /// Sign in and remember the access token
    Login {
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        role: Option<RoleArg>,
    },
    /// Create an account from a TOML file holding every wizard field
    Register { file: PathBuf },
    /// List your service requests (client) or jobs (worker)
    Requests {
        #[arg(long)]
        map: bool,
        #[arg(long, default_value = "All")]
        status: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "")]
        search: String,
        /// Show the cached list without contacting the backend
        #[arg(long)]
        offline: bool,
    },
    /// Post a new service request
    Create {
        #[arg(long)]
        category: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        budget: String,
        #[arg(long)]
        urgency: Option<String>,
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },
    /// Browse the worker directory
    Workers,
    /// Invite a worker to one of your requests
    Invite { request_id: i64, worker_id: i64 },
    /// Join the bidding lobby of a request
    Join { request_id: i64 },
    /// Place or update your bid
    Bid { request_id: i64, amount: String },
    /// Leave a bidding lobby
    Leave { request_id: i64 },
    /// Accept a worker's offer on your request
    Accept { request_id: i64, worker_id: i64 },
    /// Write in a lobby's discussion
    Say { request_id: i64, text: String },
    /// Show a lobby
    Lobby { request_id: i64 },
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{}", api_message(.0))]
    Api(#[from] ApiError),
    #[error("{0}")]
    Alert(Alert),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Registration incomplete: {0}")]
    Wizard(#[from] WizardError),
    #[error("Invalid Input: {0}")]
    Form(#[from] FormError),
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid registration file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{0}")]
    Usage(String),
}

// Transport and decode failures carry no server message, so show their cause.
fn api_message(err: &ApiError) -> String {
    match err {
        ApiError::Network(e) => format!("Could not reach the server: {e}"),
        ApiError::Decode(m) => format!("Unexpected response from the server: {m}"),
        other => other.user_message("Request failed"),
    }
}

impl CliError {
    fn lobby(action: Action) -> impl FnOnce(LobbyError) -> CliError {
        move |err| CliError::Alert(err.alert(action))
    }
}

enum LobbyCommand {
    Show,
    Join,
    Bid(String),
    Leave,
    Accept(i64),
    Say(String),
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let path = cli
        .config
        .clone()
        .or_else(AppState::default_path)
        .ok_or(ConfigError::NoConfigDir)?;
    let mut settings = AppState::load_from(&path)?;
    if let Some(url) = &cli.base_url {
        settings.base_url = url.clone();
    }

    match cli.command {
        Command::Config {
            set_base_url,
            role,
            user_id,
            timeout,
            demo_transcript,
        } => {
            if let Some(url) = set_base_url {
                settings.base_url = url;
            }
            if let Some(role) = role {
                settings.role = Some(role.into());
            }
            if user_id.is_some() {
                settings.user_id = user_id;
            }
            if let Some(timeout) = timeout {
                settings.timeout_secs = Some(timeout);
            }
            if let Some(demo) = demo_transcript {
                settings.demo_transcript = demo;
            }
            settings.save_to(&path)?;
            println!("Settings in {}", path.display());
            println!("  base url:        {}", settings.base_url);
            println!(
                "  role:            {}",
                settings.role.map(|r| r.to_string()).unwrap_or_else(|| "-".into())
            );
            println!("  signed in:       {}", settings.is_logged_in());
            println!("  timeout:         {:?}", settings.timeout());
            println!("  demo transcript: {}", settings.demo_transcript);
        }
        Command::Login { email, password, role } => {
            let mut api = settings.client()?;
            let token = api.login(&email, &password).await?;
            settings.access_token = Some(token);
            if let Some(role) = role {
                settings.role = Some(role.into());
            }
            settings.save_to(&path)?;
            println!("Signed in as {}", email);
        }
        Command::Register { file } => {
            let payload = read_form(&file)?.run()?;
            let mut api = settings.client()?;
            let token = api.register(&payload).await?;
            settings.access_token = Some(token);
            settings.role = Some(payload.role());
            settings.save_to(&path)?;
            println!("Welcome! Your {} account is ready.", payload.role());
        }
        Command::Requests {
            map,
            status,
            category,
            search,
            offline,
        } => {
            let role = require_role(&settings)?;
            let config = ListScreenConfig::for_role(role, map);
            let query = list_query(&config, &status, category.as_deref(), search)?;
            list_requests(&settings, role, &config, &query, offline).await?;
        }
        Command::Create {
            category,
            description,
            budget,
            urgency,
            lat,
            lng,
        } => {
            let form = RequestForm {
                category: Some(Category::from(category)),
                description,
                budget,
                urgency: urgency.map(Urgency::from),
                location: lat.zip(lng),
            };
            let request = form.build()?;
            let created = settings.client()?.create_request(&request).await?;
            println!("Created service request #{}", created.id);
        }
        Command::Workers => {
            let workers = settings.client()?.workers().await?;
            print!("{}", render::workers(&workers));
        }
        Command::Invite { request_id, worker_id } => {
            settings.client()?.invite_worker(request_id, worker_id).await?;
            println!("Invited worker #{} to request #{}", worker_id, request_id);
        }
        Command::Join { request_id } => lobby(&settings, request_id, LobbyCommand::Join).await?,
        Command::Bid { request_id, amount } => {
            lobby(&settings, request_id, LobbyCommand::Bid(amount)).await?
        }
        Command::Leave { request_id } => lobby(&settings, request_id, LobbyCommand::Leave).await?,
        Command::Accept { request_id, worker_id } => {
            lobby(&settings, request_id, LobbyCommand::Accept(worker_id)).await?
        }
        Command::Say { request_id, text } => {
            lobby(&settings, request_id, LobbyCommand::Say(text)).await?
        }
        Command::Lobby { request_id } => lobby(&settings, request_id, LobbyCommand::Show).await?,
    }
    Ok(())
}

fn read_form(file: &Path) -> Result<RegistrationForm, CliError> {
    let text = fs::read_to_string(file).map_err(|source| CliError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

fn require_role(settings: &AppState) -> Result<Role, CliError> {
    settings.role.ok_or_else(|| {
        CliError::Usage("No role configured; sign in with --role or run `sala7li config --role`".into())
    })
}

fn open_cache() -> Option<Cache> {
    match Cache::open_default() {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Local cache unavailable: {}", e);
            None
        }
    }
}

/// Turns command line filters into a query, refusing filters the screen
/// does not offer.
pub fn list_query(
    config: &ListScreenConfig,
    status: &str,
    category: Option<&str>,
    search: String,
) -> Result<ListQuery, CliError> {
    let status = StatusFilter::parse(status)
        .filter(|s| config.status_filters.contains(s))
        .ok_or_else(|| {
            let offered: Vec<&str> = config.status_filters.iter().map(|s| s.label()).collect();
            CliError::Usage(format!(
                "Unknown status filter '{}', expected one of: {}",
                status,
                offered.join(", ")
            ))
        })?;
    let category = match category {
        None => None,
        Some(raw) => {
            let category = Category::from(raw);
            if !config.categories.contains(&category) {
                return Err(CliError::Usage(format!(
                    "Category filter '{}' is not available on {}",
                    raw, config.title
                )));
            }
            Some(category)
        }
    };
    Ok(ListQuery {
        status,
        category,
        search,
    })
}

fn is_network(err: &ApiError) -> bool {
    matches!(err, ApiError::Network(_))
}

async fn list_requests(
    settings: &AppState,
    role: Role,
    config: &ListScreenConfig,
    query: &ListQuery,
    offline: bool,
) -> Result<(), CliError> {
    let mut cache = open_cache();
    let api = settings.client()?;
    match role {
        Role::Client => {
            let items = if offline {
                cached(&cache, |c| c.client_requests())?
            } else {
                match api.client_requests().await {
                    Ok(items) => {
                        if let Some(cache) = cache.as_mut() {
                            cache.store_client_requests(&items)?;
                        }
                        items
                    }
                    Err(e) if is_network(&e) && cache.is_some() => {
                        warn!("Backend unreachable, showing cached requests: {}", e);
                        cached(&cache, |c| c.client_requests())?
                    }
                    Err(e) => return Err(e.into()),
                }
            };
            // a client's list only holds their own requests
            show_list(&items, config, query, |_| true);
        }
        Role::Worker => {
            let items = if offline {
                cached(&cache, |c| c.worker_requests())?
            } else {
                match api.worker_requests().await {
                    Ok(items) => {
                        if let Some(cache) = cache.as_mut() {
                            cache.store_worker_requests(&items)?;
                        }
                        items
                    }
                    Err(e) if is_network(&e) && cache.is_some() => {
                        warn!("Backend unreachable, showing cached jobs: {}", e);
                        cached(&cache, |c| c.worker_requests())?
                    }
                    Err(e) => return Err(e.into()),
                }
            };
            let me = settings.user_id;
            show_list(&items, config, query, |item| {
                me.is_some() && item.request().client_id == me
            });
        }
    }
    Ok(())
}

fn cached<T>(
    cache: &Option<Cache>,
    read: impl FnOnce(&Cache) -> Result<Vec<T>, StorageError>,
) -> Result<Vec<T>, CliError> {
    match cache {
        Some(cache) => Ok(read(cache)?),
        None => Err(CliError::Usage("No cached requests available".into())),
    }
}

fn show_list<T: Listed>(
    items: &[T],
    config: &ListScreenConfig,
    query: &ListQuery,
    is_owner: impl Fn(&T) -> bool,
) {
    let (cards, region) = list_cards(items, config, query, is_owner);
    print!("{}", render::request_list(config, &cards, region));
}

async fn lobby(settings: &AppState, request_id: i64, command: LobbyCommand) -> Result<(), CliError> {
    let role = require_role(settings)?;
    let mut controller = LobbyController::new(settings.client()?, role, request_id);
    if let (Role::Worker, Some(me)) = (role, settings.user_id) {
        controller = controller.with_viewer_id(me);
    }
    let mut cache = open_cache();
    let snapshot = run_lobby(controller, cache.as_mut(), settings.demo_transcript, command).await?;
    info!("Lobby {} is {:?}", request_id, snapshot.state);
    print!("{}", render::lobby(&snapshot));
    Ok(())
}

/// Runs one lobby action with the transcript loaded from, and written back
/// to, a single thread of the cache.
async fn run_lobby<A: BiddingApi>(
    controller: LobbyController<A>,
    mut cache: Option<&mut Cache>,
    demo_transcript: bool,
    command: LobbyCommand,
) -> Result<LobbySnapshot, CliError> {
    controller.refresh().await.map_err(CliError::lobby(Action::Refresh))?;

    let thread = controller.thread_key();
    // Without an account id a worker's thread would land on the owner's.
    if controller.role() == Role::Worker && thread.worker_id.is_none() {
        warn!("No user id configured, lobby messages will not be kept");
        cache = None;
    }
    let mut transcript = match cache.as_deref() {
        Some(cache) => cache.load_transcript(thread)?,
        None => Transcript::new(),
    };
    if transcript.is_empty() && demo_transcript {
        transcript = Transcript::demo(Utc::now());
    }
    let controller = controller.with_transcript(transcript);

    let outcome = match command {
        LobbyCommand::Show => Ok(()),
        LobbyCommand::Join => controller
            .join_bidding()
            .await
            .map_err(CliError::lobby(Action::Join)),
        LobbyCommand::Bid(input) => controller
            .place_bid_input(&input)
            .await
            .map_err(CliError::lobby(Action::Bid)),
        LobbyCommand::Leave => controller
            .leave_bidding()
            .await
            .map_err(CliError::lobby(Action::Leave)),
        LobbyCommand::Accept(worker_id) => controller
            .accept_offer(worker_id)
            .await
            .map_err(CliError::lobby(Action::Accept)),
        LobbyCommand::Say(text) => controller
            .send_message(&text)
            .await
            .map(|_| ())
            .map_err(CliError::lobby(Action::Message)),
    };

    let snapshot = controller.snapshot();
    if let Some(cache) = cache {
        cache.save_transcript(thread, &snapshot.transcript)?;
    }
    outcome?;
    Ok(snapshot)
}
