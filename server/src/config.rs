use clap::Parser;
use protocol::MESSAGE_MAX_LEN;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Largest payload a single UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Smallest receive buffer that holds every valid message whole
pub const MIN_RECV_BUFFER_SIZE: usize = MESSAGE_MAX_LEN;

/// Default receive buffer, large enough that no datagram is ever cut short
pub const DEFAULT_RECV_BUFFER_SIZE: usize = MAX_DATAGRAM_SIZE;

/// Where and how the session server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: IpAddr,
    /// 0 asks the OS for an ephemeral port
    pub port: u16,
    pub recv_buffer_size: usize,
}

impl ServerConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            ..Self::default()
        }
    }

    /// Loopback on an ephemeral port
    pub fn local() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Receive buffer actually allocated, `recv_buffer_size` clamped to
    /// [`MIN_RECV_BUFFER_SIZE`]..=[`MAX_DATAGRAM_SIZE`]
    pub fn recv_buffer_len(&self) -> usize {
        self.recv_buffer_size
            .clamp(MIN_RECV_BUFFER_SIZE, MAX_DATAGRAM_SIZE)
    }
}

fn parse_buffer_size(value: &str) -> Result<usize, String> {
    let size: usize = value
        .parse()
        .map_err(|e| format!("invalid buffer size: {}", e))?;
    if !(MIN_RECV_BUFFER_SIZE..=MAX_DATAGRAM_SIZE).contains(&size) {
        return Err(format!(
            "buffer size must be between {} and {} bytes",
            MIN_RECV_BUFFER_SIZE, MAX_DATAGRAM_SIZE
        ));
    }
    Ok(size)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

/// Command line arguments of the dedicated server binary
#[derive(Parser, Debug)]
#[clap(author, version, about)]
pub struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    pub host: IpAddr,
    /// Server port to listen on, 0 for an ephemeral port
    #[clap(short, long, default_value = "0")]
    pub port: u16,
    /// Receive buffer size in bytes
    #[clap(short, long, default_value_t = DEFAULT_RECV_BUFFER_SIZE, value_parser = parse_buffer_size)]
    pub buffer_size: usize,
    /// Log filter used when RUST_LOG is unset
    #[clap(short, long, default_value = "info")]
    pub log_level: String,
}

impl From<&Args> for ServerConfig {
    fn from(args: &Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            recv_buffer_size: args.buffer_size,
        }
    }
}
