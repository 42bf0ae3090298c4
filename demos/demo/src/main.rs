use std::io::BufRead;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use socket_service::{CONNECT_EVENT, DISCONNECT_EVENT, SocketConfig, SocketService};

/// Send events typed on stdin and print the ones that come back.
///
/// Each input line is `<event> [json payload]`, e.g. `chat {"text":"hi"}`.
#[derive(Parser)]
struct Args {
    /// Server address. Defaults to SOCKET_SERVICE_URL.
    #[arg(long)]
    url: Option<String>,

    /// Inbound events to print.
    #[arg(long = "listen", default_value = "message")]
    events: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    // Log nothing unless RUST_LOG is set
    env_logger::init();
    let args = Args::parse();

    let mut config = SocketConfig::from_env();
    if let Some(url) = args.url {
        config.url = url;
    }

    let service = SocketService::connect(config);
    service.listen(CONNECT_EVENT, |_| eprintln!("* connected"));
    service.listen(DISCONNECT_EVENT, |reason| eprintln!("* disconnected: {}", reason));
    for event in args.events {
        let name = event.clone();
        service.listen(&event, move |payload| println!("<- {} {}", name, payload));
    }

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (event, payload) = match line.split_once(char::is_whitespace) {
            Some((event, raw)) => match serde_json::from_str::<Value>(raw.trim()) {
                Ok(payload) => (event, Some(payload)),
                Err(e) => {
                    eprintln!("! payload is not JSON: {}", e);
                    continue;
                }
            },
            None => (line, None),
        };

        if !service.is_connected() {
            log::warn!("not connected, {} will be dropped", event);
        }
        let acked = event.to_string();
        service.emit(
            event,
            payload,
            Some(Box::new(move || eprintln!("* {} acknowledged", acked))),
        );
    }

    // Let the connection thread finish the close handshake before exiting
    if !service.close_and_wait(Duration::from_secs(2)) {
        log::warn!("server did not acknowledge the close");
    }
    Ok(())
}
