use std::net::SocketAddr;
use std::process;

use clap::{App, Arg};
use log::{error, info, LevelFilter};
use mio::net::TcpListener;

use ringnode::directory::DirectoryClient;
use ringnode::error::{NodeError, Result};
use ringnode::event_loop;
use ringnode::ring::Ring;
use ringnode::types::{Node, NodeId};

/// Hardcoded in `original_source/main.c` as the default directory server,
/// used whenever the optional `<directory-ip> <directory-udp-port>`
/// positional arguments are omitted.
const DEFAULT_DIRECTORY_ADDR: &str = "193.136.138.142:59000";

fn main() {
    let matches = App::new("ringnode")
        .about("A node in a ring + chord peer-to-peer overlay network")
        .arg(
            Arg::with_name("initial-command")
                .short("x")
                .takes_value(true)
                .help("Runs this command immediately at startup, as if typed at the prompt"),
        )
        .arg(
            Arg::with_name("verbosity")
                .short("v")
                .takes_value(true)
                .help("Verbosity level: 0 = warn, 1 = debug, 2+ = trace"),
        )
        .arg(
            Arg::with_name("log-file")
                .short("l")
                .long("log-file")
                .takes_value(true)
                .help("Writes logs to this file instead of stderr"),
        )
        .arg(Arg::with_name("own-ip").required(true).index(1))
        .arg(Arg::with_name("own-port").required(true).index(2))
        .arg(Arg::with_name("directory-ip").index(3))
        .arg(Arg::with_name("directory-port").index(4))
        .get_matches();

    let level = match matches.value_of("verbosity").and_then(|v| v.parse::<u32>().ok()).unwrap_or(0) {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    match matches.value_of("log-file") {
        Some(path) => simple_logging::log_to_file(path, level).expect("couldn't open the log file"),
        None => simple_logging::log_to_stderr(level),
    }

    let own_ip = matches.value_of("own-ip").unwrap().to_string();
    let own_port = matches.value_of("own-port").unwrap().to_string();
    let directory_addr = match (matches.value_of("directory-ip"), matches.value_of("directory-port")) {
        (Some(ip), Some(port)) => format!("{}:{}", ip, port),
        _ => DEFAULT_DIRECTORY_ADDR.to_string(),
    };
    let initial_command = matches.value_of("initial-command").map(|s| s.to_string());

    if let Err(e) = run(own_ip, own_port, directory_addr, initial_command) {
        error!("fatal error: {}", e);
        process::exit(1);
    }
}

fn run(own_ip: String, own_port: String, directory_addr: String, initial_command: Option<String>) -> Result<()> {
    let bind_addr: SocketAddr = format!("{}:{}", own_ip, own_port)
        .parse()
        .map_err(|_| NodeError::DirectoryResolve(format!("invalid listen address {}:{}", own_ip, own_port)))?;
    let listener = TcpListener::bind(bind_addr)?;

    let udp_bind: SocketAddr = format!("{}:0", own_ip)
        .parse()
        .map_err(|_| NodeError::DirectoryResolve(format!("invalid local address {}", own_ip)))?;
    let directory = DirectoryClient::new(udp_bind, &directory_addr)?;

    let self_node = Node::new(NodeId::NONE, own_ip.clone(), own_port.clone());
    let ring = Ring::new(self_node);

    info!("listening on {}:{}, directory server at {}", own_ip, own_port, directory_addr);

    event_loop::run(ring, directory, listener, initial_command)
}
