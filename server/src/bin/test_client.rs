use clap::Parser;
use server::transfer::read_framed;
use shared::{Code, GameConfig, PlayerId, Request, StreamRequest, DEFAULT_PORT, MAX_BUFFER_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

// Sends one request and waits for its reply, retrying once on a lost datagram
async fn exchange(
    socket: &UdpSocket,
    server_addr: SocketAddr,
    request: &Request,
) -> Result<String, Box<dyn std::error::Error>> {
    let data = request.to_string();
    let mut buf = [0u8; MAX_BUFFER_SIZE];

    for _ in 0..2 {
        print!("> {}", data);
        socket.send_to(data.as_bytes(), server_addr).await?;
        if let Ok(received) = timeout(REPLY_TIMEOUT, socket.recv_from(&mut buf)).await {
            let (len, _) = received?;
            let reply = String::from_utf8_lossy(&buf[..len]).into_owned();
            print!("< {}", reply);
            return Ok(reply);
        }
        println!("No reply, retrying");
    }
    Err("server did not answer".into())
}

async fn transfer(
    server_addr: SocketAddr,
    request: &StreamRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = TcpStream::connect(server_addr).await?;
    print!("> {}", request);
    stream.write_all(request.to_string().as_bytes()).await?;

    let mut reader = BufReader::new(stream);
    let (header, payload) = read_framed(&mut reader).await?;
    print!("< {}", header);
    if !payload.is_empty() {
        println!("{}", String::from_utf8_lossy(&payload));
    }
    Ok(())
}

/// Plays a scripted debug game against a running server, then fetches the
/// transcript and the scoreboard.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server host
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port
        #[clap(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Player id to play as
        #[clap(long, default_value = "103274")]
        plid: String,
    }

    let args = Args::parse();
    let plid: PlayerId = args.plid.parse()?;
    let server_addr = format!("{}:{}", args.host, args.port).parse::<SocketAddr>()?;
    let rules = GameConfig::default();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let secret = Code::parse_compact("RGBY", &rules)?;
    exchange(&socket, server_addr, &Request::Debug { plid, time: 120, secret }).await?;

    let guesses = ["RRRR", "YBGR", "RGBY"];
    for (i, guess) in guesses.iter().enumerate() {
        let request = Request::Try {
            plid,
            guess: Code::parse_compact(guess, &rules)?,
            trial: i as u32 + 1,
        };
        let reply = exchange(&socket, server_addr, &request).await?;
        if !reply.starts_with("RTR OK") {
            break;
        }
    }

    transfer(server_addr, &StreamRequest::ShowTrials { plid }).await?;
    transfer(server_addr, &StreamRequest::Scoreboard).await?;

    Ok(())
}
