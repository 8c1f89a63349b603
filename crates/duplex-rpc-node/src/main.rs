//! duplex-rpc node — entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use duplex_rpc_node::config::{resolve_connection_config, resolve_connect_addr, resolve_listen_addr};
use duplex_rpc_node::services;
use duplex_rpc_node::transport::{dial, TcpServer};

#[derive(Parser)]
#[command(
    name = "duplex-rpc-node",
    about = "Symmetric JSON-RPC node — serve and call over one TCP connection",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept connections and serve the demo services (default).
    Serve {
        /// Listen address (host:port). Also reads DUPLEX_RPC_ADDR.
        #[arg(long)]
        addr: Option<String>,

        /// Bound on concurrently running handlers per connection (0 = unbounded).
        /// Also reads DUPLEX_RPC_MAX_IN_FLIGHT.
        #[arg(long)]
        max_in_flight: Option<usize>,
    },

    /// Dial a node and ping its Servable.
    Ping {
        /// Node address (host:port). Also reads DUPLEX_RPC_ADDR.
        #[arg(long)]
        addr: Option<String>,

        /// Text to send.
        #[arg(short, long, default_value = "hello")]
        message: String,

        /// Number of concurrent pings.
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },

    /// Print the demo services as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   duplex-rpc-node completions bash > ~/.local/share/bash-completion/completions/duplex-rpc-node
    ///   duplex-rpc-node completions zsh > ~/.zfunc/_duplex-rpc-node
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Dial a node and launch the interactive REPL.
    Repl {
        /// Node address (host:port). Also reads DUPLEX_RPC_ADDR.
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve {
        addr: None,
        max_in_flight: None,
    }) {
        Commands::Serve {
            addr,
            max_in_flight,
        } => {
            let addr = resolve_listen_addr(addr.as_deref());
            let config = resolve_connection_config(max_in_flight);
            let server = TcpServer::bind(&addr, config).await?;
            tokio::select! {
                result = server.run() => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
            }
        }

        Commands::Ping {
            addr,
            message,
            count,
        } => {
            let addr = resolve_connect_addr(addr.as_deref());
            let (conn, _serving) = dial(&addr, resolve_connection_config(None)).await?;
            let mut failed = 0;
            for result in services::ping_many(&conn, &message, count).await {
                match result {
                    Ok(reply) => println!("{reply}"),
                    Err(e) => {
                        failed += 1;
                        eprintln!("Ping failed: {e}");
                    }
                }
            }
            conn.close().await?;
            if failed > 0 {
                anyhow::bail!("{failed} of {count} pings failed");
            }
        }

        Commands::Info => {
            let services = services::describe().await?;
            let info = serde_json::json!({
                "node": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "services": services,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "duplex-rpc-node", &mut std::io::stdout());
        }

        Commands::Repl { addr } => {
            let addr = resolve_connect_addr(addr.as_deref());
            let (conn, _serving) = dial(&addr, resolve_connection_config(None)).await?;
            let runtime = tokio::runtime::Handle::current();
            let shell_conn = conn.clone();
            tokio::task::spawn_blocking(move || duplex_rpc_node::repl::run(shell_conn, runtime))
                .await??;
            conn.close().await?;
        }
    }

    Ok(())
}
