use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use parley_cli::logging::{init_logging, LogSink};
use parley_cli::{console, relay};
use parley_core::{Config, SqliteStore};
use parley_net::{LogObserver, Router};

#[derive(Parser)]
#[command(name = "parley-server")]
#[command(version)]
#[command(about = "Chat relay server")]
struct Cli {
    /// Address to listen on
    #[arg(short = 'a', long)]
    address: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Session database file
    #[arg(long)]
    db: Option<PathBuf>,
    /// Debug-level file logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_path = init_logging(LogSink::Server, cli.verbose)?;

    let config = Config::load();
    let host = cli.address.as_deref().unwrap_or(config.bind_address());
    let port = cli.port.unwrap_or(config.server_port());
    let addr = relay::socket_address(host, port);
    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path());

    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("cannot open database {}", db_path.display()))?,
    );
    let router = Router::bind(&addr, relay::router_config(&config), Arc::clone(&store), LogObserver)
        .with_context(|| format!("cannot listen on {}", addr))?;
    let local = router.local_addr().context("listener has no local address")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        use signal_hook::consts::signal::{SIGINT, SIGTERM};
        use signal_hook::flag;
        flag::register(SIGINT, Arc::clone(&shutdown))?;
        flag::register(SIGTERM, Arc::clone(&shutdown))?;
    }

    let router_handle = {
        let shutdown = Arc::clone(&shutdown);
        let mut router = router;
        thread::Builder::new()
            .name("parley-router".into())
            .spawn(move || router.run(&shutdown))
            .context("cannot start router thread")?
    };

    println!("parley relay listening on {}", local);
    println!("database: {}", db_path.display());
    println!("log: {}", log_path.display());
    log::info!("relay listening on {} (db {})", local, db_path.display());

    // The console blocks on stdin, so it gets its own thread; the main
    // thread watches the flag that both signals and `exit` set.
    {
        let shutdown = Arc::clone(&shutdown);
        let store = Arc::clone(&store);
        thread::Builder::new()
            .name("parley-console".into())
            .spawn(move || {
                let stdin = io::stdin();
                let mut stdout = io::stdout();
                match console::run(stdin.lock(), &mut stdout, &store) {
                    Ok(true) => shutdown.store(true, Ordering::Relaxed),
                    Ok(false) => log::info!("console input closed; relay keeps running"),
                    Err(e) => log::error!("console failed: {}", e),
                }
            })
            .context("cannot start console thread")?;
    }

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    println!("Shutting down...");
    if router_handle.join().is_err() {
        log::error!("router thread panicked");
    }
    log::info!("relay stopped");
    Ok(())
}
