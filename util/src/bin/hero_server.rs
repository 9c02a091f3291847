use clap::Parser;
use hero_proto::decode_command;
use hero_transport::{logging, HeroServer};
use std::time::Duration;

/// Runs a demo HERO echo server: every GIVE/TAKE the server receives is logged and echoed back
/// prefixed with `Echo: `.
#[derive(Parser)]
#[command(name = "hero-server", version, about)]
struct Args {
    /// UDP port to bind.
    #[arg(long, default_value_t = 9999)]
    port: u16,

    /// slog terminal level (critical, error, warning, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    let log = logging::terminal_logger(&args.log_level);

    let mut server = HeroServer::start_with_logger(args.port, log.clone())
        .unwrap_or_else(|err| panic!("failed to bind hero-server on port {}: {:?}", args.port, err));

    logging::debug!(log, "hero-server running"; "context" => "main", "port" => args.port);

    loop {
        server.poll(|packet, host, port, reply| {
            let (mnemonic, fields) = decode_command(&packet.payload);
            logging::debug!(log, "packet received";
                "context" => "poll", "peer" => format!("{}:{}", host, port), "mnemonic" => mnemonic, "fields" => fields.len());

            let mut message = b"Echo: ".to_vec();
            message.extend_from_slice(&packet.payload);
            reply.reply(&message);
        });

        std::thread::sleep(Duration::from_millis(10));
    }
}
