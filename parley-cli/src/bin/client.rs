use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use clap::Parser;

use parley_cli::chat::{self, Input};
use parley_cli::logging::{init_logging, LogSink};
use parley_cli::relay;
use parley_core::Config;
use parley_net::{ChatClient, ClientError};

#[derive(Parser)]
#[command(name = "parley-client")]
#[command(version)]
#[command(about = "Console chat client")]
struct Cli {
    /// Relay address
    address: Option<String>,
    /// Relay port
    port: Option<u16>,
    /// Your account name
    #[arg(short, long)]
    name: Option<String>,
    /// Who to send messages to
    #[arg(short = 't', long = "to")]
    destination: Option<String>,
    /// Debug-level file logging
    #[arg(short, long)]
    verbose: bool,
}

fn prompt(label: &str) -> Result<String> {
    let stdin = io::stdin();
    loop {
        print!("{}", label);
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            bail!("input closed");
        }
        let value = line.trim();
        if !value.is_empty() {
            return Ok(value.to_string());
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogSink::Client, cli.verbose)?;

    let config = Config::load();
    let host = cli.address.as_deref().unwrap_or(config.client_server_address());
    let port = cli.port.unwrap_or(config.client_port());
    let addr = relay::socket_address(host, port);

    println!("parley console client");
    let name = match cli.name {
        Some(name) => name,
        None => prompt("Your name: ")?,
    };
    let mut destination = match cli.destination {
        Some(destination) => destination,
        None => prompt("Send to: ")?,
    };

    let mut client = match ChatClient::connect(addr.as_str(), &name) {
        Ok(client) => client,
        Err(ClientError::Server { code, error }) => {
            bail!("relay at {} refused '{}' ({}): {}", addr, name, code, error)
        }
        Err(e) => return Err(e).with_context(|| format!("cannot connect to {}", addr)),
    };
    println!("Connected to {} as '{}'. Type #help for commands.", addr, name);

    let listener = client
        .spawn_listener(|message| println!("{}", chat::format_incoming(&message)))
        .context("cannot start listener thread")?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match Input::parse(&line) {
            Input::Empty => {}
            Input::Help => println!("{}", chat::HELP),
            Input::To(name) => {
                destination = name;
                println!("Now sending to '{}'.", destination);
            }
            Input::Exit => break,
            Input::Message(text) => match client.send_message(&destination, &text) {
                Ok(()) => {}
                Err(e @ ClientError::FrameTooLarge { .. }) => println!("Not sent: {}", e),
                Err(e) => {
                    log::error!("send failed: {}", e);
                    println!("Connection lost: {}", e);
                    break;
                }
            },
        }
    }

    if let Err(e) = client.send_exit() {
        log::warn!("could not send exit: {}", e);
    }
    client.shutdown()?;
    let _ = listener.join();
    println!("Chat finished, '{}' left.", name);
    Ok(())
}
