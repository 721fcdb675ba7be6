use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::*;
use meshroom_client::{
    ClientConfig, ClientEvent, Continuity, ContinuityStore, Direction, RoomClient, RoomHandle,
    RtcTransportFactory, TransferEvent, connect_signaling,
};
use meshroom_core::{ConnectionId, IceServerConfig, Identity, Role, RoomId, TransferId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Join a meshroom room: chat and trade files with everyone in it.
#[derive(Debug, Parser)]
#[command(name = "meshroom-client", version, about)]
struct Args {
    /// Signaling endpoint
    #[arg(short, long, env = "MESHROOM_SERVER", default_value = "ws://127.0.0.1:8000/ws")]
    server: String,

    /// E-mail or nickname; defaults to the one used last time
    #[arg(short, long)]
    identity: Option<String>,

    /// Room to join; defaults to the one used last time
    #[arg(short, long)]
    room: Option<String>,

    /// File to offer once the first peer is linked (repeatable)
    #[arg(long = "offer")]
    offers: Vec<PathBuf>,

    /// Accept every offered file without asking
    #[arg(long)]
    auto_accept: bool,

    /// Where received files are written
    #[arg(long, default_value = ".")]
    download_dir: PathBuf,

    /// Extra STUN/TURN urls
    #[arg(long = "ice-server")]
    ice_servers: Vec<String>,
}

struct Session {
    room: RoomHandle,
    store: ContinuityStore,
    identity: Identity,
    auto_accept: bool,
    download_dir: PathBuf,
    pending_offers: Vec<PathBuf>,
    offered_by: HashMap<TransferId, ConnectionId>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store = ContinuityStore::default_location();
    let remembered = store.load();

    let identity = args
        .identity
        .map(Identity::new)
        .or(remembered.identity)
        .context("No identity given and none remembered, pass --identity")?;
    let room_id = args
        .room
        .map(RoomId::new)
        .or(remembered.room)
        .context("No room given and none remembered, pass --room")?;

    let mut config = ClientConfig::new(args.server, identity.clone(), room_id.clone());
    config.ice_servers = args
        .ice_servers
        .into_iter()
        .map(|url| IceServerConfig {
            urls: vec![url],
            username: None,
            credential: None,
        })
        .collect();
    config.transfer.validate()?;

    println!(
        "{}",
        format!("Joining {} as {}...", room_id, identity).cyan().bold()
    );
    let signaling = connect_signaling(&config.server_url).await?;
    let (room, mut events, task) = RoomClient::start(config, RtcTransportFactory, signaling);

    let mut session = Session {
        room,
        store,
        identity,
        auto_accept: args.auto_accept,
        download_dir: args.download_dir,
        pending_offers: args.offers,
        offered_by: HashMap::new(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            evt = events.recv() => {
                let Some(evt) = evt else { break };
                if !session.on_event(evt).await {
                    break;
                }
            }

            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match session.on_input(line.trim()).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => eprintln!("{} {:#}", "error:".red().bold(), e),
                    },
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!("stdin closed: {}", e);
                        stdin_open = false;
                    }
                }
            }
        }
    }

    let _ = session.room.leave().await;
    let _ = task.await;
    println!("{}", "Bye.".dimmed());
    Ok(())
}

impl Session {
    /// Returns `false` when the session is over.
    async fn on_event(&mut self, evt: ClientEvent) -> bool {
        match evt {
            ClientEvent::Connected { connection_id } => {
                println!("{} {}", "connected as".dimmed(), connection_id);
            }
            ClientEvent::Joined {
                room_id,
                role,
                locked,
                existing_members,
            } => {
                let role = match role {
                    Role::Host => "host".yellow().bold(),
                    Role::Guest => "guest".normal(),
                };
                println!(
                    "{} {} as {} ({} others{})",
                    "joined".green().bold(),
                    room_id,
                    role,
                    existing_members.len(),
                    if locked { ", locked" } else { "" }
                );
                let state = Continuity {
                    identity: Some(self.identity.clone()),
                    room: Some(room_id),
                };
                if let Err(e) = self.store.save(&state) {
                    warn!("Could not remember session: {:#}", e);
                }
            }
            ClientEvent::Waiting => println!("{}", "room is locked, waiting for the host...".yellow()),
            ClientEvent::Approved => println!("{}", "the host let you in".green()),
            ClientEvent::Denied { reason } => {
                println!("{} {:?}", "not admitted:".red().bold(), reason);
                return false;
            }
            ClientEvent::Kicked => {
                println!("{}", "you were removed from the room".red().bold());
                return false;
            }
            ClientEvent::MemberJoined {
                connection_id,
                identity,
            } => println!("{} {} ({})", "+".green(), identity, connection_id),
            ClientEvent::MemberLeft {
                connection_id,
                identity,
            } => println!("{} {} ({})", "-".red(), identity, connection_id),
            ClientEvent::Roster { members } => {
                println!("{} {} in room", "roster:".dimmed(), members.len());
            }
            ClientEvent::HostChanged {
                identity, is_self, ..
            } => {
                if is_self {
                    println!("{}", "you are now the host".yellow().bold());
                } else {
                    println!("{} {}", "new host:".yellow(), identity);
                }
            }
            ClientEvent::Locked(state) => {
                let text = if state { "room locked" } else { "room unlocked" };
                println!("{}", text.yellow());
            }
            ClientEvent::Knock {
                identity,
                requester,
            } => println!(
                "{} {} wants in, /approve {} or /deny {}",
                "knock:".magenta().bold(),
                identity,
                requester,
                requester
            ),
            ClientEvent::Chat { from, text, .. } => {
                println!("{} {}", format!("[{}]", from).blue(), text);
            }
            ClientEvent::LinkReady { peer } => {
                println!("{} {}", "linked with".dimmed(), peer);
                for path in std::mem::take(&mut self.pending_offers) {
                    if let Err(e) = self.offer(&path).await {
                        eprintln!("{} {:#}", "error:".red().bold(), e);
                    }
                }
            }
            ClientEvent::LinkState { .. } | ClientEvent::LinkClosed { .. } => {}
            ClientEvent::Transfer(evt) => self.on_transfer(evt).await,
            ClientEvent::ServerError { message, .. } => {
                eprintln!("{} {}", "server:".red(), message);
            }
            ClientEvent::Disconnected => {
                println!("{}", "lost connection to the server".red().bold());
                return false;
            }
        }
        true
    }

    async fn on_transfer(&mut self, evt: TransferEvent) {
        match evt {
            TransferEvent::Offered {
                peer,
                transfer_id,
                name,
                size,
            } => {
                self.offered_by.insert(transfer_id, peer);
                println!(
                    "{} {} ({} bytes) from {}, /accept {}",
                    "offer:".cyan().bold(),
                    name,
                    size,
                    peer,
                    transfer_id
                );
                if self.auto_accept {
                    if let Err(e) = self.room.accept(peer, transfer_id).await {
                        eprintln!("{} {:#}", "error:".red().bold(), e);
                    }
                }
            }
            TransferEvent::Progress {
                transfer_id,
                direction,
                percent,
                ..
            } => {
                if percent % 10 == 0 {
                    println!("{} {} {}%", arrow(direction), transfer_id, percent);
                }
            }
            TransferEvent::Completed {
                transfer_id,
                name,
                data,
                ..
            } => {
                println!("{} {} {}", "done:".green().bold(), transfer_id, name);
                if let Some(data) = data {
                    match self.save(&name, &data) {
                        Ok(path) => println!("   saved to {}", path.display()),
                        Err(e) => eprintln!("{} {:#}", "error:".red().bold(), e),
                    }
                }
            }
            TransferEvent::Cancelled { transfer_id, .. } => {
                println!("{} {}", "cancelled:".yellow(), transfer_id);
            }
            TransferEvent::Failed {
                transfer_id,
                reason,
                ..
            } => println!("{} {} {}", "failed:".red().bold(), transfer_id, reason),
        }
    }

    /// Returns `false` on `/quit`.
    async fn on_input(&mut self, line: &str) -> Result<bool> {
        if line.is_empty() {
            return Ok(true);
        }
        if !line.starts_with('/') {
            self.room.chat(line).await?;
            return Ok(true);
        }

        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        match cmd {
            "/quit" => return Ok(false),
            "/offer" => self.offer(Path::new(arg)).await?,
            "/accept" => {
                let transfer_id: TransferId = arg.parse()?;
                let Some(peer) = self.offered_by.get(&transfer_id) else {
                    bail!("no offer {}", transfer_id);
                };
                self.room.accept(*peer, transfer_id).await?;
            }
            "/cancel" => self.room.cancel(arg.parse()?).await?,
            "/lock" => self.room.lock(true).await?,
            "/unlock" => self.room.lock(false).await?,
            "/kick" => self.room.kick(arg.parse()?).await?,
            "/approve" => self.room.approve(arg.parse()?).await?,
            "/deny" => self.room.deny(arg.parse()?).await?,
            other => bail!(
                "unknown command {other}, try /offer /accept /cancel /lock /unlock /kick /approve /deny /quit"
            ),
        }
        Ok(true)
    }

    async fn offer(&self, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());

        let transfer_id = self.room.offer_file(name.clone(), data).await?;
        println!("{} {} as {}", "offered".cyan(), name, transfer_id);
        Ok(())
    }

    fn save(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        let file_name = Path::new(name)
            .file_name()
            .context("Offered file has no usable name")?;
        let path = self.download_dir.join(file_name);
        std::fs::write(&path, data).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn arrow(direction: Direction) -> ColoredString {
    match direction {
        Direction::Send => "↑".cyan(),
        Direction::Receive => "↓".green(),
    }
}
