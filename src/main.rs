use std::net::Ipv4Addr;
use std::sync::Arc;
use streamwire::{Config, Listener, SystemClock, TunChannel};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// usage: streamwire [tun-name] [local-addr] [port]
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "tun0".to_string());
    let local_addr: Ipv4Addr = match args.next().map(|a| a.parse()).transpose() {
        Ok(addr) => addr.unwrap_or(Ipv4Addr::new(10, 0, 0, 1)),
        Err(e) => {
            error!("invalid local address: {}", e);
            std::process::exit(2);
        }
    };
    let port: u16 = match args.next().map(|a| a.parse()).transpose() {
        Ok(port) => port.unwrap_or(7),
        Err(e) => {
            error!("invalid port: {}", e);
            std::process::exit(2);
        }
    };

    let channel = match TunChannel::open(&name, local_addr) {
        Ok(channel) => channel,
        Err(e) => {
            error!("failed to open {}: {}", name, e);
            std::process::exit(1);
        }
    };
    info!("echo server on {} ({}:{})", channel.name(), local_addr, port);

    let mut listener = Listener::bind(Arc::new(channel), port, Arc::new(SystemClock), Config::default());
    listener.on_accept(|conn| {
        info!("accepted {}", conn.id());
        conn.on_receive(|conn, payload| {
            if payload.is_empty() {
                info!("{} closed by peer", conn.id());
            } else {
                conn.send(payload);
            }
        });
    });

    if let Err(e) = listener.run() {
        error!("listener stopped: {}", e);
        std::process::exit(1);
    }
}
