// CLI entry point for the CoT relay.
//
// Starts a relay that echoes every terminator-delimited message from any
// client back to all connected clients, sender included. The relay never
// looks inside the payloads. See `server.rs` for the networking
// architecture and `registry.rs` for participant management.
//
// Usage:
//   cotrelay <port>
//
// While running, press 'Q' to exit; any other key prints the current
// participant count. Ctrl+C triggers the same orderly shutdown.

use std::time::Duration;

use cot_relay::server::{RelayConfig, start_relay};
use cot_relay::terminal;

fn main() {
    let port = parse_args();

    let config = RelayConfig {
        port,
        ..RelayConfig::default()
    };

    let (handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    println!("Relay listening on {addr}");
    println!("Press 'Q' to exit");

    // Ctrl+C requests the same orderly shutdown as the Q key.
    let signal = handle.stop_signal();
    ctrlc::set_handler(move || signal.request_stop()).ok();

    let raw_mode = terminal::RawMode::enable();
    while handle.is_running() {
        if let Some(key) = terminal::key_pressed() {
            if key == b'q' || key == b'Q' {
                break;
            }
            println!(
                "{} participants currently; press 'Q' to exit",
                handle.participant_count()
            );
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    drop(raw_mode); // restore the terminal before final output

    println!("\nShutting down...");
    handle.stop();
}

/// Parse command-line arguments. The listen port is the single required
/// argument; anything else is a usage error.
fn parse_args() -> u16 {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(0);
    }

    if args.len() != 2 {
        eprintln!("Usage: {} <port>", args.first().map_or("cotrelay", String::as_str));
        std::process::exit(1);
    }

    match args[1].parse() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("'{}' is not a valid port number", args[1]);
            eprintln!("Usage: {} <port>", args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("Usage: cotrelay <port>");
    println!();
    println!("Listens for TCP connections on <port> and broadcasts every");
    println!("'</event>'-terminated message to all connected clients,");
    println!("including the sender.");
    println!();
    println!("While running: 'Q' quits; any other key prints the current");
    println!("participant count. Ctrl+C also shuts down cleanly.");
}
