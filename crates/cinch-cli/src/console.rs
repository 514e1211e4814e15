//! Console – an interactive view onto a running device.
//!
//! Lines starting with `{` are JSON wire frames and are published as-is:
//!
//! ```text
//! {"topic": 800, "type": "set", "key": "owner", "value": "avatar-1"}
//! {"topic": 700, "type": "acl_query", "avatar": "avatar-1"}
//! ```
//!
//! Everything else is a slash-command; see [`Command`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cinch_middleware::EventBus;
use cinch_runtime::{Device, SimPluginSpec};
use cinch_types::{Envelope, HostEvent, Topic, WireFrame};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::debug;

/// Source stamped on everything the console publishes.
pub const CONSOLE_SOURCE: &str = "console";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Publish(WireFrame),
    Plugins,
    Presence,
    Spawn { context: String, auto_return: bool },
    Stop { context: String },
    Host(HostEvent),
    /// Toggle printing of bus traffic.
    Trace(bool),
    Quit,
}

impl Command {
    /// Parse a wire frame or a slash-command.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.starts_with('{') {
            return WireFrame::parse(line)
                .map(Command::Publish)
                .map_err(|e| format!("bad frame: {e}"));
        }
        let mut words = line.split_whitespace();
        let head = words.next().unwrap_or_default();
        let arg = words.next();
        let rest = words.next();
        match (head, arg, rest) {
            ("/help", None, None) => Ok(Command::Help),
            ("/plugins", None, None) => Ok(Command::Plugins),
            ("/presence", None, None) => Ok(Command::Presence),
            ("/spawn", Some(context), None) => Ok(Command::Spawn {
                context: context.to_string(),
                auto_return: false,
            }),
            ("/spawn", Some(context), Some("auto")) => Ok(Command::Spawn {
                context: context.to_string(),
                auto_return: true,
            }),
            ("/stop", Some(context), None) => Ok(Command::Stop {
                context: context.to_string(),
            }),
            ("/attach", Some(wearer), None) => Ok(Command::Host(HostEvent::Attached {
                wearer: wearer.to_string(),
            })),
            ("/region", None, None) => Ok(Command::Host(HostEvent::RegionChanged)),
            ("/teleport", None, None) => Ok(Command::Host(HostEvent::Teleported)),
            ("/trace", Some("on"), None) => Ok(Command::Trace(true)),
            ("/trace", Some("off"), None) => Ok(Command::Trace(false)),
            ("/quit" | "/exit", None, None) => Ok(Command::Quit),
            _ => Err(format!("unknown command '{line}'")),
        }
    }
}

/// Run the console until `/quit`, end of input or `shutdown` is raised.
pub async fn run(mut device: Device, shutdown: Arc<AtomicBool>) {
    let tracing_on = Arc::new(AtomicBool::new(true));
    spawn_traffic_printer(device.bus(), tracing_on.clone());
    let mut lines = spawn_stdin_reader();
    let mut poll = tokio::time::interval(Duration::from_millis(200));

    prompt();
    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    prompt();
                    continue;
                }
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => execute(command, &mut device, &tracing_on),
                    Err(e) => println!("{} {}", "✗".red(), e),
                }
                prompt();
            }
            _ = poll.tick() => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }
    println!("{}", "Goodbye.".green());
    device.shutdown();
}

fn execute(command: Command, device: &mut Device, tracing_on: &AtomicBool) {
    match command {
        Command::Help => print_help(),
        Command::Publish(frame) => {
            let envelope = Envelope::new(CONSOLE_SOURCE, frame.message);
            if let Err(e) = device.bus().publish_to(frame.topic, envelope) {
                println!("{} {}", "✗".red(), e);
            }
        }
        Command::Plugins => {
            for context in device.plugins() {
                println!("  • {}", context.bold());
            }
        }
        Command::Presence => {
            for id in device.presence().snapshot() {
                println!("  • {}", id);
            }
        }
        Command::Spawn { context, auto_return } => {
            let mut spec = SimPluginSpec::new(context);
            spec.auto_return = auto_return;
            device.spawn_plugin(spec);
        }
        Command::Stop { context } => {
            if !device.stop_plugin(&context) {
                println!("{} no plugin '{}'", "✗".red(), context);
            }
        }
        Command::Host(event) => device.host_event(event),
        Command::Trace(on) => tracing_on.store(on, Ordering::SeqCst),
        Command::Quit => {}
    }
}

fn spawn_traffic_printer(bus: &EventBus, enabled: Arc<AtomicBool>) {
    for topic in Topic::ALL {
        let mut rx = bus.subscribe_to(topic);
        let enabled = enabled.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rx.next().await {
                if enabled.load(Ordering::Relaxed) {
                    println!("{}", render(&envelope));
                }
            }
        });
    }
}

/// One line per envelope: `[topic] source  {json}`.
pub fn render(envelope: &Envelope) -> String {
    let body = serde_json::to_string(&envelope.message).unwrap_or_else(|e| format!("<unencodable: {e}>"));
    format!(
        "{} {} {}",
        format!("[{}]", envelope.topic()).dimmed(),
        envelope.source.cyan(),
        body
    )
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    // Blocking stdin on its own thread; the runtime never waits on it.
    std::thread::spawn(move || {
        use std::io::BufRead;
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
        debug!("stdin closed");
    });
    rx
}

fn prompt() {
    use std::io::Write;
    print!("{} ", "cinch>".bold().cyan());
    std::io::stdout().flush().ok();
}

fn print_help() {
    println!();
    println!("{}", "Cinch Console".bold().underline());
    println!("  {}                 – publish a wire frame", "{json}".bold().cyan());
    println!("  {}                – list running plugins", "/plugins".bold().cyan());
    println!("  {}               – list the presence set", "/presence".bold().cyan());
    println!("  {}  – start a simulated plugin", "/spawn <ctx> [auto]".bold().cyan());
    println!("  {}           – stop a plugin without deregistering", "/stop <ctx>".bold().cyan());
    println!("  {}       – attach to a new wearer", "/attach <wearer>".bold().cyan());
    println!("  {}     – simulate a region change / teleport", "/region /teleport".bold().cyan());
    println!("  {}        – show or hide bus traffic", "/trace on|off".bold().cyan());
    println!("  {}           – exit", "/quit  /exit".bold().cyan());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinch_types::Message;

    #[test]
    fn parses_wire_frames() {
        let cmd = Command::parse(r#"{"topic":700,"type":"acl_query","avatar":"a"}"#).unwrap();
        match cmd {
            Command::Publish(frame) => {
                assert_eq!(frame.topic, Topic::Auth);
                assert_eq!(frame.message, Message::AclQuery { avatar: "a".into() });
            }
            other => panic!("expected publish, got {other:?}"),
        }
    }

    #[test]
    fn rejects_frames_on_the_wrong_lane() {
        assert!(Command::parse(r#"{"topic":500,"type":"settings_get"}"#).is_err());
    }

    #[test]
    fn parses_slash_commands() {
        assert_eq!(Command::parse("/help").unwrap(), Command::Help);
        assert_eq!(
            Command::parse("/spawn bell auto").unwrap(),
            Command::Spawn { context: "bell".into(), auto_return: true }
        );
        assert_eq!(
            Command::parse("  /stop bell ").unwrap(),
            Command::Stop { context: "bell".into() }
        );
        assert_eq!(
            Command::parse("/attach avatar-1").unwrap(),
            Command::Host(HostEvent::Attached { wearer: "avatar-1".into() })
        );
        assert_eq!(Command::parse("/trace off").unwrap(), Command::Trace(false));
        assert_eq!(Command::parse("/exit").unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_unknown_or_malformed_commands() {
        assert!(Command::parse("/launch").is_err());
        assert!(Command::parse("/stop").is_err());
        assert!(Command::parse("/trace maybe").is_err());
        assert!(Command::parse("/spawn bell later").is_err());
    }

    #[test]
    fn render_names_topic_and_source() {
        colored::control::set_override(false);
        let line = render(&Envelope::new("cinch-kernel", Message::RegisterNow));
        assert!(line.contains("[500]"));
        assert!(line.contains("cinch-kernel"));
        assert!(line.contains(r#""type":"register_now""#));
    }
}
