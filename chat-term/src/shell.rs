//! Terminal shell: stdin commands in, engine calls out. Answers approval prompts with the next line.

use std::io;

use chat_core::DiscoveredDevice;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use crate::discovery::Scanner;
use crate::engine::{ChatEngine, EngineError};
use crate::presenter::{ApprovalRequest, Presenter};
use crate::transport::Transport;

const HELP: &str = "\
/scan                   list devices
/connect <n|address>    connect to scanned device n, or to an address
/find <name>            scan and connect to the device with that name
/disconnect             end the current chat
/peer                   show who you are talking to
/quit                   exit
anything else           send as a message";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Scan,
    Connect(String),
    Find(String),
    Disconnect,
    Peer,
    Help,
    Quit,
    Say(String),
    Empty,
    Unknown(String),
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };
    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (rest, ""),
    };
    match (cmd.to_ascii_lowercase().as_str(), arg) {
        ("scan", _) => Command::Scan,
        ("connect", a) if !a.is_empty() => Command::Connect(a.to_string()),
        ("find", a) if !a.is_empty() => Command::Find(a.to_string()),
        ("disconnect", _) => Command::Disconnect,
        ("peer", _) => Command::Peer,
        ("help", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// What `/connect` points at.
#[derive(Debug, PartialEq, Eq)]
enum Target {
    Device(DiscoveredDevice),
    Address(String),
}

/// `/connect` target: an index into the last scan, else a literal address.
fn resolve_target(arg: &str, devices: &[DiscoveredDevice]) -> Option<Target> {
    match arg.parse::<usize>() {
        Ok(i) => devices.get(i).cloned().map(Target::Device),
        Err(_) => Some(Target::Address(arg.to_string())),
    }
}

fn report(e: EngineError) {
    tracing::debug!(error = %e, rejection = e.is_rejection(), "Engine call did not succeed");
}

/// Run until /quit or stdin closes.
pub async fn run<T, P, S>(
    engine: ChatEngine<T, P, S>,
    mut approvals: mpsc::UnboundedReceiver<ApprovalRequest>,
) -> io::Result<()>
where
    T: Transport,
    P: Presenter,
    S: Scanner,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (scan_tx, mut scan_rx) = mpsc::unbounded_channel::<Vec<DiscoveredDevice>>();
    let mut pending: Option<oneshot::Sender<bool>> = None;
    let mut devices: Vec<DiscoveredDevice> = Vec::new();

    loop {
        tokio::select! {
            Some(req) = approvals.recv() => {
                println!("{} is trying to connect. Accept? [y/N]", req.peer);
                pending = Some(req.reply);
            }
            Some(found) = scan_rx.recv() => {
                for (i, d) in found.iter().enumerate() {
                    println!("{}: {} [{}]", i, d.name, d.address);
                }
                devices = found;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Some(reply) = pending.take() {
                    let _ = reply.send(is_yes(&line));
                    continue;
                }
                match parse(&line) {
                    Command::Empty => {}
                    Command::Say(text) => {
                        match engine.send(&text).await {
                            Ok(sent) => println!("{sent}"),
                            Err(e) => report(e),
                        }
                    }
                    Command::Scan => {
                        let engine = engine.clone();
                        let scan_tx = scan_tx.clone();
                        tokio::spawn(async move {
                            if let Ok(found) = engine.scan().await {
                                let _ = scan_tx.send(found);
                            }
                        });
                    }
                    Command::Connect(arg) => match resolve_target(&arg, &devices) {
                        Some(Target::Device(device)) => {
                            let engine = engine.clone();
                            tokio::spawn(async move {
                                if let Err(e) = engine.connect_device(&device).await {
                                    report(e);
                                }
                            });
                        }
                        Some(Target::Address(addr)) => {
                            let attempt = engine.spawn_connect(addr);
                            tokio::spawn(async move {
                                if let Ok(Err(e)) = attempt.await {
                                    report(e);
                                }
                            });
                        }
                        None => println!("* No device {arg} in the last scan. Run /scan first."),
                    },
                    Command::Find(name) => {
                        let engine = engine.clone();
                        tokio::spawn(async move {
                            if let Err(e) = engine.connect_by_name(&name).await {
                                report(e);
                            }
                        });
                    }
                    Command::Disconnect => {
                        if let Err(e) = engine.disconnect().await {
                            report(e);
                        }
                    }
                    Command::Peer => match engine.peer().await {
                        Some(peer) => println!("* Chatting with {peer} as {}", engine.local()),
                        None => println!("* Not connected ({}).", engine.state().await),
                    },
                    Command::Help => println!("{HELP}"),
                    Command::Quit => break,
                    Command::Unknown(cmd) => println!("* Unknown command {cmd}. Type /help."),
                }
            }
        }
    }
    Ok(())
}
