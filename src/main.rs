use arcall::assets::{DEFAULT_FILTER_ADDR, DEFAULT_RELAY_ADDR, RELAY_SERVICE_PORT};
use arcall::config::{self, CallConfig, Mode, RelayConfig};
use arcall::relay::RelayServer;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::{panic, process};

fn parse_mode() -> Mode {
    let matches = Command::new(config::app_name())
        .version(config::version())
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("relay")
                .long("relay")
                .action(ArgAction::SetTrue)
                .help("Run as the signaling relay instead of a call participant."),
        )
        .arg(
            Arg::new("relay-addr")
                .long("relay-addr")
                .value_name("URL")
                .default_value(DEFAULT_RELAY_ADDR)
                .help("Relay to dial when running as a participant."),
        )
        .arg(
            Arg::new("filter-addr")
                .long("filter-addr")
                .value_name("ADDR")
                .default_value(DEFAULT_FILTER_ADDR)
                .help("TCP address of the AR filter process."),
        )
        .arg(
            Arg::new("source")
                .long("source")
                .value_name("PATH")
                .required_unless_present("relay")
                .help("Video input streamed into the call."),
        )
        .get_matches();

    if matches.get_flag("relay") {
        Mode::Relay(RelayConfig {
            listen_addr: format!("0.0.0.0:{RELAY_SERVICE_PORT}"),
        })
    } else {
        Mode::Call(CallConfig {
            relay_url: matches
                .get_one::<String>("relay-addr")
                .cloned()
                .unwrap_or_default(),
            filter_addr: matches
                .get_one::<String>("filter-addr")
                .cloned()
                .unwrap_or_default(),
            source: matches
                .get_one::<String>("source")
                .map(PathBuf::from)
                .unwrap_or_default(),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // invoke the default handler and exit the process
        orig_hook(panic_info);
        process::exit(105);
    }));

    // gracefully end the process on SIGINT, SIGTERM, or SIGHUP
    ctrlc::set_handler(move || {
        process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    match parse_mode() {
        Mode::Relay(config) => {
            RelayServer::bind(&config.listen_addr).await?.run().await?;
        }
        Mode::Call(config) => {
            arcall::call::run(config).await?;
        }
    }

    Ok(())
}
