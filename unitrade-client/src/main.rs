use anyhow::Context;
use clap::{Parser, Subcommand};
use unitrade_client::services::ProductQuery;
use unitrade_client::{ClientConfig, SessionManager, SessionState, logging};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API base URL (overrides UNITRADE_API_BASE_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Credential database URL (overrides UNITRADE_DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "UNITRADE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log out and wipe the stored session
    Logout,
    /// Show the signed-in user
    Whoami {
        /// Fetch the profile from the server instead of the cache
        #[arg(long)]
        refresh: bool,
    },
    /// List products
    Products {
        /// Search term
        #[arg(short, long)]
        search: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        page: Option<u32>,
    },
}

fn print_value(value: &serde_json::Value, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ClientConfig::from_env().context("Invalid configuration")?;
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    logging::init_logging(&config.log_filter)?;

    let manager = SessionManager::connect(config)
        .await
        .context("Failed to open session store")?;
    manager.hydrate().await.context("Failed to restore session")?;

    match args.command {
        Command::Login { email, password } => {
            let user = manager
                .login(&email, &password)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            if args.json {
                print_value(user.as_value(), true)?;
            } else {
                println!("Logged in as {}", user.email().unwrap_or(&email));
            }
        }
        Command::Logout => {
            if manager.state() == SessionState::Unauthenticated {
                println!("Not logged in");
            }
            manager
                .logout()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        }
        Command::Whoami { refresh } => {
            let user = if refresh {
                Some(
                    manager
                        .refresh_profile()
                        .await
                        .map_err(|e| anyhow::anyhow!(e.user_message()))?,
                )
            } else {
                manager.current_user()
            };
            match user {
                Some(user) => print_value(user.as_value(), args.json)?,
                None => anyhow::bail!("Not logged in"),
            }
        }
        Command::Products {
            search,
            category,
            page,
        } => {
            let query = ProductQuery {
                search,
                category,
                page,
                ..ProductQuery::default()
            };
            let products = manager
                .products()
                .list(&query)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            for product in &products {
                if args.json {
                    print_value(product, true)?;
                } else {
                    let name = product.get("name").and_then(|t| t.as_str()).unwrap_or("?");
                    let price = product.get("price").map(|p| p.to_string()).unwrap_or_default();
                    let id = product.get("id").map(|i| i.to_string()).unwrap_or_default();
                    println!("#{id:<6} {name}  {price}");
                }
            }
        }
    }

    Ok(())
}
