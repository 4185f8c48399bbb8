use std::time::Duration;

use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::value::RawValue;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as Frame;
use ws_relay::net::ListenAddr;
use ws_relay::relay::Message;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Send and watch messages on a ws-relay endpoint", long_about = None)]
struct Cli {
    /// Relay address (`unix:/path` or `host:port`).
    #[arg(short, long, default_value = "unix:/tmp/ws-relay.sock")]
    address: String,

    /// Upgrade route.
    #[arg(short, long, default_value = "/websocket/")]
    route: String,

    /// Seconds to wait for replies after sending.
    #[arg(short, long, default_value_t = 5)]
    wait: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message with a raw JSON payload
    Send { id: String, data: String },
    /// Present a token and print the login reply
    Token { token: String },
    /// Print incoming messages until the relay closes
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let outgoing = match &cli.command {
        Commands::Send { id, data } => Some(Message::from_raw(
            id.as_str(),
            Some(RawValue::from_string(data.clone())?),
        )),
        Commands::Token { token } => Some(Message::new("token", token)?),
        Commands::Watch => None,
    };
    let wait = match cli.command {
        Commands::Watch => None,
        _ => Some(Duration::from_secs(cli.wait)),
    };

    match cli.address.parse::<ListenAddr>()? {
        ListenAddr::Tcp(addr) => {
            let stream = tokio::net::TcpStream::connect(addr).await?;
            let url = format!("ws://{}{}", addr, cli.route);
            session(stream, &url, outgoing, wait).await
        }
        #[cfg(unix)]
        ListenAddr::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(&path).await?;
            let url = format!("ws://localhost{}", cli.route);
            session(stream, &url, outgoing, wait).await
        }
        #[cfg(not(unix))]
        ListenAddr::Unix(_) => Err("unix sockets are not supported on this platform".into()),
    }
}

async fn session<S>(
    stream: S,
    url: &str,
    outgoing: Option<Message>,
    wait: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws, _response) = tokio_tungstenite::client_async(url, stream).await?;

    if let Some(message) = outgoing {
        ws.send(Frame::text(message.to_json()?)).await?;
    }

    let deadline = wait.map(|wait| Instant::now() + wait);
    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, ws.next()).await {
                Ok(next) => next,
                Err(_) => break,
            },
            None => ws.next().await,
        };

        match next {
            Some(Ok(Frame::Text(text))) => print_frame(text.as_str()),
            Some(Ok(Frame::Binary(bytes))) => print_frame(&String::from_utf8_lossy(&bytes)),
            Some(Ok(Frame::Close(_))) | None => {
                eprintln!("Relay closed the connection");
                return Ok(());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }

    ws.close(None).await?;
    Ok(())
}

fn print_frame(text: &str) {
    match Message::from_json(text) {
        Ok(message) => println!("{}: {}", message.id(), message.payload().unwrap_or("null")),
        Err(_) => println!("(unparsed) {}", text),
    }
}
