use futures_util::StreamExt;
use pairlink::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

const SIDE: u32 = 3;
const CELLS: usize = (SIDE * SIDE) as usize;

/// Hidden targets on a 3x3 grid. Both players shoot at the same layout,
/// which the starting player sends as the round's initial state.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Board {
    targets: [bool; CELLS],
    shots: [bool; CELLS],
}

impl Board {
    fn new(targets: &[usize]) -> Result<Self, String> {
        let mut board = Self {
            targets: [false; CELLS],
            shots: [false; CELLS],
        };
        for &cell in targets {
            if cell >= CELLS {
                return Err(format!("cell {cell} is off the board"));
            }
            board.targets[cell] = true;
        }
        if board.remaining() == 0 {
            return Err("need at least one target".into());
        }
        Ok(board)
    }

    /// Decodes a layout sent in `START`: one byte per target cell.
    fn from_state(state: &[u8]) -> Result<Self, String> {
        let cells: Vec<usize> = state.iter().map(|&b| b as usize).collect();
        Self::new(&cells)
    }

    fn to_state(&self) -> Vec<u8> {
        (0..CELLS)
            .filter(|&i| self.targets[i])
            .map(|i| i as u8)
            .collect()
    }

    /// Shoots at `(row, col)`. Returns whether it hit.
    fn fire(&mut self, row: u32, col: u32) -> Result<bool, String> {
        if row >= SIDE || col >= SIDE {
            return Err("row and col must be 0-2".into());
        }
        let cell = (row * SIDE + col) as usize;
        if self.shots[cell] {
            return Err("already fired there".into());
        }
        self.shots[cell] = true;
        Ok(self.targets[cell])
    }

    fn remaining(&self) -> usize {
        (0..CELLS)
            .filter(|&i| self.targets[i] && !self.shots[i])
            .count()
    }

    fn hits(&self) -> i64 {
        (0..CELLS).filter(|&i| self.targets[i] && self.shots[i]).count() as i64
    }
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Role {
    Host { bind: String },
    Join { peer: String },
}

fn parse_args(args: &[String]) -> Result<(Role, Option<String>), String> {
    let usage = "usage: duel host <bind-addr> [name] | duel join <peer-addr> [name]";
    let (Some(role), Some(addr)) = (args.first(), args.get(1)) else {
        return Err(usage.into());
    };
    let name = args.get(2).cloned();
    match role.as_str() {
        "host" => Ok((Role::Host { bind: addr.clone() }, name)),
        "join" => Ok((Role::Join { peer: addr.clone() }, name)),
        _ => Err(usage.into()),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Ready(bool),
    Start(Vec<usize>),
    Fire { row: u32, col: u32 },
    Sync,
    Chat(String),
    Get(String),
    Mode(SessionMode),
    Rematch,
    Status,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match word {
        "ready" => Ok(Command::Ready(true)),
        "unready" => Ok(Command::Ready(false)),
        "start" if rest.is_empty() => Ok(Command::Start(vec![0, 4, 8])),
        "start" => rest
            .split_whitespace()
            .map(|n| n.parse().map_err(|_| format!("bad cell {n:?}")))
            .collect::<Result<Vec<usize>, String>>()
            .map(Command::Start),
        "fire" => {
            let mut nums = rest.split_whitespace().map(str::parse::<u32>);
            match (nums.next(), nums.next(), nums.next()) {
                (Some(Ok(row)), Some(Ok(col)), None) => Ok(Command::Fire { row, col }),
                _ => Err("usage: fire <row> <col>".into()),
            }
        }
        "sync" => Ok(Command::Sync),
        "say" if !rest.is_empty() => Ok(Command::Chat(rest.to_owned())),
        "get" if !rest.is_empty() => Ok(Command::Get(rest.to_owned())),
        "mode" => match rest {
            "coop" => Ok(Command::Mode(SessionMode::Cooperative)),
            "versus" => Ok(Command::Mode(SessionMode::Competitive)),
            _ => Err("usage: mode coop|versus".into()),
        },
        "rematch" => Ok(Command::Rematch),
        "status" => Ok(Command::Status),
        "quit" => Ok(Command::Quit),
        _ => Err(format!("unknown command {word:?}")),
    }
}

// ---------------------------------------------------------------------------
// Session loop
// ---------------------------------------------------------------------------

struct Duel {
    session: SessionHandle,
    board: Option<Board>,
}

impl Duel {
    /// Applies one local command. Returns `false` to quit.
    async fn command(&mut self, cmd: Command) -> Result<bool, PairlinkError> {
        match cmd {
            Command::Ready(ready) => {
                if !self.session.set_local_ready(ready).await? {
                    println!("(not connected)");
                }
            }
            Command::Start(cells) => match Board::new(&cells) {
                Ok(board) => {
                    if !self.session.start_game(board.to_state()).await? {
                        println!("(not connected)");
                    }
                }
                Err(e) => println!("{e}"),
            },
            Command::Fire { row, col } => {
                let Some(board) = self.board.as_mut() else {
                    println!("no round in progress");
                    return Ok(true);
                };
                match board.fire(row, col) {
                    Ok(hit) => {
                        println!("{}", if hit { "hit!" } else { "miss" });
                        self.session.send_move(row, col, hit).await?;
                        if board.remaining() == 0 {
                            println!("all targets down");
                            self.session.send_game_over(true, board.hits()).await?;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            Command::Sync => match &self.board {
                Some(board) => {
                    self.session.send_state(board.to_state()).await?;
                }
                None => println!("no round in progress"),
            },
            Command::Chat(text) => {
                self.session.send_chat(text).await?;
            }
            Command::Get(id) => {
                self.session.request(id).await?;
            }
            Command::Mode(mode) => self.session.set_mode(mode).await?,
            Command::Rematch => {
                self.board = None;
                self.session.reset_round().await?;
            }
            Command::Status => println!("{:?}", self.session.snapshot().await?),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connection(ConnectionEvent::PeerConnected { label, .. }) => {
                println!("connected to {label}");
            }
            SessionEvent::Connection(ConnectionEvent::ConnectionLost { reason }) => {
                println!("connection lost: {reason}");
            }
            SessionEvent::Connection(ConnectionEvent::ConnectFailed { reason, .. }) => {
                println!("connect failed: {reason}");
            }
            SessionEvent::Connection(ConnectionEvent::CapabilityDenied { operation, reason }) => {
                println!("{operation} refused: {reason}");
            }
            SessionEvent::Connection(event) => tracing::debug!(?event, "connection event"),
            SessionEvent::SessionOpened { session_id } => println!("session {session_id} opened"),
            SessionEvent::SessionClosed { session_id } => {
                self.board = None;
                println!("session {session_id} closed");
            }
            SessionEvent::PeerHello { display_name } => println!("{display_name} says hello"),
            SessionEvent::Ack { note } => println!("ack: {note}"),
            SessionEvent::RemoteReady(ready) => println!("peer ready: {ready}"),
            SessionEvent::BothReady => println!("both ready, type `start`"),
            SessionEvent::GameStarted(state) => match Board::from_state(&state) {
                Ok(board) => {
                    println!("round started, {} targets hidden", board.remaining());
                    self.board = Some(board);
                }
                Err(e) => println!("peer sent a bad board: {e}"),
            },
            SessionEvent::RemoteMove {
                row,
                col,
                succeeded,
            } => {
                let outcome = if succeeded { "hit" } else { "missed" };
                println!("peer fired at ({row}, {col}) and {outcome}");
            }
            SessionEvent::StateSync(state) => println!("peer layout: {state:?}"),
            SessionEvent::Chat(text) => println!("peer: {text}"),
            SessionEvent::GameOver { won, score } => {
                println!("peer finished (won: {won}, score: {score})");
            }
            SessionEvent::Request { resource_id } => {
                println!("peer asked for {resource_id:?}, nothing to share");
            }
            SessionEvent::Response { payload } => println!("got: {payload}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pairlink::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (role, name) = parse_args(&args)?;

    let mut builder = Pairlink::builder().content_provider(
        StaticContent::new().with("rules", "hit every hidden target first; fire <row> <col>"),
    );
    if let Some(name) = name {
        builder = builder.display_name(name);
    }
    let link = match &role {
        Role::Host { bind } => builder.bind(bind).policy(RolePolicy::Server).build()?,
        Role::Join { .. } => builder.build()?,
    };
    let (session, events) = link.split();

    match role {
        Role::Host { bind } => {
            eprintln!("waiting for a peer on {bind}");
            session.listen().await?;
        }
        Role::Join { peer } => {
            eprintln!("connecting to {peer}");
            session.connect(peer).await?;
        }
    }

    let mut duel = Duel {
        session: session.clone(),
        board: None,
    };
    let mut events = into_event_stream(events);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(cmd) => {
                        if !duel.command(cmd).await? {
                            break;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            event = events.next() => match event {
                Some(event) => duel.event(event),
                None => break,
            },
        }
    }

    session.shutdown().await?;
    Ok(())
}
