use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use keysync_client::{
    Directory, HttpDirectory, LoginOutcome, SessionContext, SessionInfo, Source, SyncClient,
};
use keysync_core::kek_vault::KeyringKekVault;

#[derive(Parser)]
#[command(name = "keysync")]
#[command(about = "End-to-end encrypted message sync client", long_about = None)]
struct Cli {
    /// Directory service base URL
    #[arg(long, env = "KEYSYNC_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Local store root (defaults to the platform data directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new account on this device
    Register {
        username: String,
    },

    /// Log in, recovering onto this device if needed
    Login {
        username: String,
    },

    /// Send an encrypted message
    Send {
        username: String,
        content: String,
    },

    /// List decrypted messages
    Messages {
        username: String,

        /// Serve from the local mirror without contacting the server
        #[arg(long)]
        offline: bool,

        /// User id for offline reads (no login round-trip happens offline)
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Remove this device's local trust material for a user id
    Forget {
        user_id: String,
    },

    /// Dump the server's debug snapshot
    Debug,
}

/// Log in, walking through device recovery if this device is not yet trusted.
async fn authenticate(
    client: &SyncClient<HttpDirectory>,
    username: &str,
) -> Result<SessionContext> {
    match client.login(username).await? {
        LoginOutcome::Authenticated(ctx) => Ok(ctx),
        LoginOutcome::RecoveryRequired(pending) => {
            eprintln!("This device is not registered for {username}.");
            let passphrase = rpassword::prompt_password("Recovery passphrase: ")?;
            Ok(client.recover_device(&pending, &passphrase).await?)
        }
    }
}

fn print_messages(result: &keysync_client::MessageFetchResult) {
    if result.source == Source::Cache {
        eprintln!("(serving from local cache)");
    }
    for message in &result.messages {
        println!(
            "{}  {}",
            message.created_at.format("%Y-%m-%d %H:%M:%S"),
            message.content
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keysync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store_root = match cli.data_dir {
        Some(dir) => dir,
        None => keysync_core::paths::data_dir()?,
    };
    let directory = HttpDirectory::new(&cli.server)?;
    let client = SyncClient::new(directory, Arc::new(KeyringKekVault), &store_root)?;

    match cli.command {
        Commands::Register { username } => {
            let passphrase = rpassword::prompt_password("Recovery passphrase: ")?;
            let confirm = rpassword::prompt_password("Confirm passphrase: ")?;
            let ctx = client.register(&username, &passphrase, &confirm).await?;
            println!("registered {} ({})", ctx.username(), ctx.user_id());
        }

        Commands::Login { username } => {
            let ctx = authenticate(&client, &username).await?;
            println!("logged in as {} ({})", ctx.username(), ctx.user_id());
        }

        Commands::Send { username, content } => {
            let ctx = authenticate(&client, &username).await?;
            let message = client.send_message(&ctx, &content).await?;
            println!("sent {}", message.id);
        }

        Commands::Messages {
            username,
            offline,
            user_id,
        } => {
            let ctx = if offline {
                let Some(user_id) = user_id else {
                    bail!("--offline requires --user-id");
                };
                client.set_simulated_offline(true);
                SessionContext::new(SessionInfo { user_id, username })
            } else {
                authenticate(&client, &username).await?
            };
            let result = client.fetch_messages(&ctx).await?;
            print_messages(&result);
        }

        Commands::Forget { user_id } => {
            client.forget_device(&user_id)?;
            println!("removed local trust material for {user_id}");
        }

        Commands::Debug => {
            let info = client.directory().debug_info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}
