use clap::Parser;
use protocol::{Message, MessageType, PlayerState, Point3, State};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout, Duration};

/// Scripted peer for poking at a running session server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address of the session server
    #[clap(short, long, default_value = "127.0.0.1:7777")]
    server: SocketAddr,
    /// Number of chat messages to send
    #[clap(short, long, default_value = "5")]
    count: u32,
}

async fn send(
    socket: &UdpSocket,
    server: SocketAddr,
    message: &Message,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = message.encode()?;
    println!("Sending {:?} ({} bytes)", message.kind, data.len());
    socket.send_to(&data, server).await?;
    Ok(())
}

// Print whatever other peers relayed to us within the window
async fn drain(socket: &UdpSocket, window: Duration) {
    let mut buf = [0u8; 2048];
    while let Ok(received) = timeout(window, socket.recv_from(&mut buf)).await {
        match received {
            Ok((len, addr)) => match Message::decode(&buf[..len]) {
                Ok(message) => println!(
                    "Relayed from {}: {:?} with {} payload bytes",
                    addr,
                    message.kind,
                    message.payload().len()
                ),
                Err(e) => println!("Failed to decode relay: {}", e),
            },
            Err(e) => {
                println!("Error receiving relay: {}", e);
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let spawn = PlayerState::new(State::Idle, 0.0, 0.0, false, 0.0, Point3::new(0.0, 1.0, 0.0));
    send(&socket, args.server, &Message::new(MessageType::PlayerJoin, spawn.encode())).await?;

    // The server must shrug this off
    println!("Sending garbage datagram");
    socket.send_to(b"definitely not a message", args.server).await?;

    for i in 0..args.count {
        let chat = Message::new(MessageType::ChatNotify, format!("test message {}", i));
        send(&socket, args.server, &chat).await?;
        drain(&socket, Duration::from_millis(200)).await;
        sleep(Duration::from_secs(1)).await;
    }

    send(&socket, args.server, &Message::empty(MessageType::PlayerLeft)).await?;
    println!("Test client finished");
    Ok(())
}
