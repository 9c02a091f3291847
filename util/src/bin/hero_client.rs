use clap::Parser;
use hero_transport::{logging, HeroClient};
use std::time::Duration;

/// Runs a demo HERO client: connects, sends one text message, prints the reply, then disconnects.
#[derive(Parser)]
#[command(name = "hero-client", version, about)]
struct Args {
    /// Host to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// UDP port to connect to.
    #[arg(long, default_value_t = 9999)]
    port: u16,

    /// Message to send.
    #[arg(long, default_value = "hello")]
    message: String,

    /// slog terminal level (critical, error, warning, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    let log = logging::terminal_logger(&args.log_level);

    let mut client = HeroClient::with_logger(log.clone()).expect("failed to bind local UDP socket");

    // Opaque peer-identity placeholder; HERO performs no key agreement.
    let pubkey = [1u8, 2, 3, 4];

    if !client.connect(&args.host, args.port, &pubkey) {
        logging::debug!(log, "connect failed"; "context" => "main", "host" => &args.host, "port" => args.port);
        std::process::exit(1);
    }

    if !client.send_text(&args.message) {
        logging::debug!(log, "send failed"; "context" => "main");
        std::process::exit(1);
    }

    match client.receive(Duration::from_secs(5)) {
        Some(packet) => println!("{}", String::from_utf8_lossy(&packet.payload)),
        None => eprintln!("no reply within 5s"),
    }

    client.disconnect();
}
