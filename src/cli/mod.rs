pub mod daemon;
pub mod jobs;

use clap::{Parser, Subcommand};

/// fetchd - periodically mirror remote files and serve them locally
#[derive(Parser, Debug)]
#[command(
    name = "fetchd",
    version,
    about = "fetchd - periodically mirror remote files and serve them locally"
)]
pub struct Cli {
    /// Daemon host
    #[arg(long, default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// Daemon port
    #[arg(long, default_value_t = 8378, global = true)]
    pub port: u16,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon in the foreground
    Start {
        /// Path to configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Data directory path
        #[arg(long = "data-dir")]
        data_dir: Option<String>,

        /// Directory downloaded files are written under
        #[arg(long = "storage-root")]
        storage_root: Option<String>,
    },

    /// Stop the daemon
    Stop,

    /// Show daemon status
    Status,

    /// Register a new fetch job
    Add {
        /// Remote location to download from
        #[arg(short = 'u', long = "url")]
        url: String,

        /// Destination, relative to the storage root
        #[arg(short = 'l', long = "local-path")]
        local_path: String,

        /// Path under /files/ the downloaded file is served at
        #[arg(short = 's', long = "serve-path")]
        public_path: String,

        /// Refresh period in minutes (0 = manual only)
        #[arg(short = 'p', long, default_value_t = 0)]
        period: u64,
    },

    /// Remove a fetch job
    Remove {
        /// Job UUID
        job: String,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List all fetch jobs
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch a job's remote source now
    Trigger {
        /// Job UUID
        job: String,
    },
}

/// Build the base URL for the daemon HTTP API.
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

/// Format a connection error message for when the daemon is not reachable.
pub fn connection_error_message(host: &str, port: u16) -> String {
    format!(
        "Could not connect to daemon at {}:{}. Is it running? (try: fetchd start)",
        host, port
    )
}

/// Helper to handle reqwest errors and produce a user-friendly connection error.
pub(crate) fn handle_request_error(err: reqwest::Error, host: &str, port: u16) -> anyhow::Error {
    if err.is_connect() || err.is_timeout() {
        anyhow::anyhow!("{}", connection_error_message(host, port))
    } else {
        anyhow::anyhow!("Request failed: {}", err)
    }
}

/// Dispatch the CLI command to the appropriate handler.
pub async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Start {
            config,
            port,
            data_dir,
            storage_root,
        }) => {
            daemon::cmd_start(
                &cli.host,
                config.as_deref(),
                *port,
                data_dir.as_deref(),
                storage_root.as_deref(),
                cli.verbose,
            )
            .await
        }
        Some(Commands::Stop) => daemon::cmd_stop(&cli.host, cli.port).await,
        Some(Commands::Status) => daemon::cmd_status(&cli.host, cli.port, cli.verbose).await,
        Some(Commands::Add {
            url,
            local_path,
            public_path,
            period,
        }) => jobs::cmd_add(&cli.host, cli.port, url, local_path, public_path, *period).await,
        Some(Commands::Remove { job, yes }) => {
            jobs::cmd_remove(&cli.host, cli.port, job, *yes).await
        }
        Some(Commands::List { json }) => jobs::cmd_list(&cli.host, cli.port, *json).await,
        Some(Commands::Trigger { job }) => jobs::cmd_trigger(&cli.host, cli.port, job).await,
        None => {
            // No subcommand provided -- print help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
