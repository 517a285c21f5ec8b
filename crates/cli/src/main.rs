#![forbid(unsafe_code)]

//! `boost`: command-line board over the local SQLite store.

mod commands;
mod config;
mod session;

use anyhow::Context;
use boost_board::{Board, BoardContext};
use boost_core::UserId;
use boost_storage::{AuthProvider, LocalAuth, SqliteStore};
use clap::{Parser, Subcommand};
use config::Config;
use session::Session;
use std::path::PathBuf;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "boost", version, about = "Goal board with typed columns")]
struct Cli {
    /// Config file (default: ./boost.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage directory; overrides `data_dir` from the config
    #[arg(long, global = true, env = "BOOST_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Act as this user for one command without changing the saved session
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage node types
    Types {
        #[command(subcommand)]
        action: TypesAction,
    },
    /// Submit a text node
    Submit {
        text: String,
        /// Type display name or key
        #[arg(long = "type", default_value = "Goal")]
        type_name: String,
    },
    /// Submit a file node
    Upload {
        file: PathBuf,
        #[arg(long = "type", default_value = "Goal")]
        type_name: String,
    },
    /// Delete a submitted node
    Rm { node_id: String },
    /// Replace the text of a submitted node
    Edit { node_id: String, text: String },
    /// Pin a node at a canvas position and print the resulting board
    Move { node_id: String, x: f64, y: f64 },
    /// Print the board
    Show {
        /// Only show this type
        #[arg(long = "type")]
        type_name: Option<String>,
        #[arg(long)]
        width: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Sign in; staged nodes are saved under this user
    Login { user: String },
    /// Sign out
    Logout,
    /// Usage dashboard over recorded events
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TypesAction {
    List,
    Add { name: String },
    Rm { name: String },
    Rename { name: String, display_name: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir.clone() {
        config.data_dir = data_dir;
    }
    init_tracing(&config.log_filter);

    run(cli, config)
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let store = Rc::new(
        SqliteStore::open(&config.data_dir)
            .with_context(|| format!("opening store in {}", config.data_dir.display()))?,
    );
    let mut session = Session::load(&config.data_dir)?;

    let override_user = cli.user.map(UserId::try_new).transpose()?;
    let acting = override_user.clone().or_else(|| session.user_id.clone());
    let auth = Rc::new(match acting {
        Some(user) => LocalAuth::signed_in(user),
        None => LocalAuth::new(),
    });
    tracing::debug!(data_dir = %config.data_dir.display(), user = ?auth_user(&auth), "starting");

    let context = BoardContext::new(store.clone(), store.clone(), auth.clone())
        .with_layout(config.layout)
        .with_transforms(config.transforms.clone())
        .with_viewport_width(config.viewport_width);
    let mut board = Board::with_staging(context, std::mem::take(&mut session.staging));
    board.pump();

    let outcome = commands::execute(&mut board, &auth, store.as_ref(), cli.command);
    board.pump();

    for notice in board.take_notices() {
        eprintln!("{}", notice.message());
    }

    session.staging = board.staging().clone();
    if override_user.is_none() {
        session.user_id = auth_user(&auth);
    }
    drop(board);
    session.save(&config.data_dir)?;

    outcome
}

fn auth_user(auth: &LocalAuth) -> Option<UserId> {
    auth.state().user().cloned()
}
