//! `armoury`: command-line client for the armouryd control daemon

mod cli;

use anyhow::Context;
use armoury_core::client::is_daemon_available;
use armoury_core::DaemonClient;

use cli::Invocation;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    eprintln!("armoury {} - control an ASUS laptop through armouryd", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    armoury [OPTIONS] <METHOD> [ARGS...]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("        --debug         Log the exchange with the daemon");
    eprintln!("    -s, --socket PATH   Daemon socket");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("METHODS:");
    for (method, args) in cli::METHODS {
        eprintln!("    {} {}", method, args);
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let (socket_path, debug, request) = match cli::parse_args(&args) {
        Ok(Invocation::Call { socket_path, debug, request }) => (socket_path, debug, request),
        Ok(Invocation::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("armoury {}", VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run 'armoury --help' for the list of methods.");
            std::process::exit(2);
        }
    };

    let filter = if debug {
        "debug".to_string()
    } else {
        std::env::var("ARMOURY_LOG").unwrap_or_else(|_| "warn".to_string())
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    if !is_daemon_available(&socket_path) {
        anyhow::bail!(
            "armouryd is not running (no socket at {})",
            socket_path.display()
        );
    }

    let method = request.type_name();
    tracing::debug!("{} via {}", method, socket_path.display());
    let mut client = DaemonClient::connect(&socket_path)?;
    let data = client
        .call(request)
        .with_context(|| format!("{} failed", method))?;

    println!("{}", cli::render(&data));

    // Boolean methods report failure as `false`
    if data.flag == Some(false) && !method.starts_with("Is") {
        std::process::exit(1);
    }
    Ok(())
}
