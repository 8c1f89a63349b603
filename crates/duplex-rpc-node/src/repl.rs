//! Interactive shell over a live duplex connection.
//!
//! Launch with `duplex-rpc-node repl` to dial a node and call it by hand. The peer
//! can call back into this process while the shell waits for input.
//! Type `/help` for available commands, Tab for completion.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use serde_json::Value;
use tokio::runtime::Handle;

use duplex_rpc::Connection;

use crate::config::history_path;
use crate::services;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/call", "Call a peer method: /call Service.Method <json>"),
    ("/ping", "Ping the peer's Servable"),
    ("/services", "List services this side exposes"),
    ("/stats", "Show connection counters"),
    ("/pending", "List calls waiting for a reply"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Leave the shell and close the connection"),
];

/// Commands whose name starts with `prefix`.
fn matching_commands(prefix: &str) -> impl Iterator<Item = &'static (&'static str, &'static str)> + '_ {
    COMMANDS.iter().filter(move |(name, _)| name.starts_with(prefix))
}

/// Line-editor helper: completes command names, and method names after `/call`.
struct ShellHelper {
    /// `Service.Method` names offered after `/call`.
    targets: Vec<String>,
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let typed = &line[..pos];
        match typed.split_once(' ') {
            None => {
                let candidates = matching_commands(typed)
                    .map(|(name, about)| Pair {
                        display: format!("{name:<10} {about}"),
                        replacement: format!("{name} "),
                    })
                    .collect();
                Ok((0, candidates))
            }
            Some(("/call", target)) if !target.contains(' ') => {
                let candidates = self
                    .targets
                    .iter()
                    .filter(|t| t.starts_with(target))
                    .map(|t| Pair {
                        display: t.clone(),
                        replacement: format!("{t} "),
                    })
                    .collect();
                Ok((typed.len() - target.len(), candidates))
            }
            Some(_) => Ok((pos, Vec::new())),
        }
    }
}

impl Hinter for ShellHelper {
    type Hint = String;

    /// Greyed-out rest of the first command that fits what is typed so far.
    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos != line.len() || !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        matching_commands(line)
            .map(|(name, _)| *name)
            .find(|name| name.len() > line.len())
            .map(|name| name[line.len()..].to_string())
    }
}

impl Highlighter for ShellHelper {}
impl Validator for ShellHelper {}
impl Helper for ShellHelper {}

/// Tab accepts a visible hint, otherwise opens the completion list.
struct TabAcceptsHint;

impl ConditionalEventHandler for TabAcceptsHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        Some(if ctx.has_hint() {
            Cmd::CompleteHint
        } else {
            Cmd::Complete
        })
    }
}

/// Split `/call` arguments into the target and its JSON argument.
///
/// A missing argument is sent as `null`.
pub fn parse_call(args: &str) -> Result<(String, Value), String> {
    let args = args.trim();
    if args.is_empty() {
        return Err("Usage: /call Service.Method <json>".to_string());
    }
    let (target, raw) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    if !target.contains('.') {
        return Err(format!("'{target}' is not of the form Service.Method"));
    }
    let raw = raw.trim();
    let argument = if raw.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(raw).map_err(|e| format!("Argument is not valid JSON: {e}"))?
    };
    Ok((target.to_string(), argument))
}

/// What the shell does after a line.
enum Flow {
    Continue,
    Quit,
}

/// Run the interactive REPL on a connection that is already being served.
///
/// Blocks the calling thread; `runtime` drives the calls. Must not be called from
/// inside an async task.
pub fn run(conn: Connection, runtime: Handle) -> anyhow::Result<()> {
    let targets = runtime
        .block_on(conn.services())
        .into_iter()
        .flat_map(|service| {
            let prefix = service.name;
            service
                .methods
                .into_iter()
                .map(move |m| format!("{prefix}.{}", m.name))
        })
        .collect();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();
    let mut editor: Editor<ShellHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    editor.set_helper(Some(ShellHelper { targets }));
    editor.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabAcceptsHint)),
    );

    let history = history_path();
    if history.exists() {
        if let Err(e) = editor.load_history(&history) {
            tracing::debug!("History not loaded from {}: {e}", history.display());
        }
    }

    eprintln!(
        "\n  \x1b[1mduplex-rpc-node {}\x1b[0m  \x1b[90mconnected; the peer may call us while you type\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("  \x1b[90m/help lists commands, Tab completes, Ctrl-D leaves.\x1b[0m\n");

    loop {
        let line = match editor.readline(" \x1b[36mrpc>\x1b[0m ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90mnothing to interrupt; /exit leaves the shell\x1b[0m");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("  Input error: {err}");
                break;
            }
        };
        if let Flow::Quit = execute(&conn, &runtime, line.trim()) {
            break;
        }
    }
    eprintln!("  \x1b[90mleaving shell, closing connection\x1b[0m");

    if let Some(dir) = history.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    if let Err(e) = editor.save_history(&history) {
        tracing::debug!("History not saved to {}: {e}", history.display());
    }
    Ok(())
}

/// Run one shell line. A leading `/` is optional.
fn execute(conn: &Connection, runtime: &Handle, line: &str) -> Flow {
    if line.is_empty() {
        return Flow::Continue;
    }
    let line = line.strip_prefix('/').unwrap_or(line);
    let (command, args) = line.split_once(' ').unwrap_or((line, ""));
    let args = args.trim();

    match command {
        "" | "help" | "?" => cmd_help(),
        "exit" | "quit" | "q" => return Flow::Quit,
        "clear" => eprint!("\x1b[2J\x1b[H"),
        "call" => cmd_call(conn, runtime, args),
        "ping" => cmd_ping(conn, runtime, args),
        "services" => cmd_services(conn, runtime),
        "stats" => cmd_stats(conn),
        "pending" => cmd_pending(conn),
        other => eprintln!("  No command '/{other}'; try /help."),
    }
    Flow::Continue
}

fn cmd_help() {
    eprintln!();
    for (name, about) in COMMANDS {
        eprintln!("  {name:<10} {about}");
    }
    eprintln!();
}

fn cmd_call(conn: &Connection, runtime: &Handle, args: &str) {
    let (target, argument) = match parse_call(args) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("  {msg}");
            return;
        }
    };

    match runtime.block_on(conn.call::<Value, Value>(&target, &argument)) {
        Ok(reply) => {
            let shown = serde_json::to_string_pretty(&reply).unwrap_or_else(|_| reply.to_string());
            eprintln!("  {shown}");
        }
        Err(e) if e.is_remote() => eprintln!("  \x1b[31mRemote error:\x1b[0m {e}"),
        Err(e) => eprintln!("  \x1b[31mCall failed:\x1b[0m {e}"),
    }
}

fn cmd_ping(conn: &Connection, runtime: &Handle, args: &str) {
    let message = if args.is_empty() { "ping" } else { args };
    match runtime.block_on(services::ping(conn, message)) {
        Ok(reply) => eprintln!("  {reply}"),
        Err(e) => eprintln!("  \x1b[31mPing failed:\x1b[0m {e}"),
    }
}

fn cmd_services(conn: &Connection, runtime: &Handle) {
    let services = runtime.block_on(conn.services());
    eprintln!();
    eprintln!("  {} service(s) exposed to the peer:", services.len());
    for service in &services {
        eprintln!();
        eprintln!("    {}", service.name);
        for method in &service.methods {
            eprintln!(
                "      {:<12} {} -> {}",
                method.name, method.arg_type, method.reply_type
            );
        }
    }
    eprintln!();
}

fn cmd_stats(conn: &Connection) {
    let stats = conn.stats();
    let state = if conn.is_stopped() { "stopped" } else { "running" };
    eprintln!();
    eprintln!("  Dispatch loop:       {state}");
    eprintln!("  Requests dispatched: {}", stats.requests_dispatched);
    eprintln!("  Dispatch failures:   {}", stats.dispatch_failures);
    eprintln!("  Responses matched:   {}", stats.responses_matched);
    eprintln!("  Stale responses:     {}", stats.stale_responses);
    eprintln!("  Malformed dropped:   {}", stats.malformed_dropped);
    eprintln!();
}

fn cmd_pending(conn: &Connection) {
    let pending = conn.pending_calls();
    if pending.is_empty() {
        eprintln!("  No calls waiting.");
        return;
    }
    eprintln!();
    for call in &pending {
        eprintln!("    #{:<6} {} {}", call.id, call.method, call.argument);
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_call_with_argument() {
        let (target, arg) = parse_call(r#"Servable.Echo {"a": 1}"#).unwrap();
        assert_eq!(target, "Servable.Echo");
        assert_eq!(arg, json!({"a": 1}));
    }

    #[test]
    fn test_parse_call_without_argument() {
        let (target, arg) = parse_call("Servable.Ping").unwrap();
        assert_eq!(target, "Servable.Ping");
        assert_eq!(arg, Value::Null);
    }

    #[test]
    fn test_parse_call_errors() {
        assert!(parse_call("").is_err());
        assert!(parse_call("Ping \"x\"").unwrap_err().contains("Service.Method"));
        assert!(parse_call("Servable.Ping {oops")
            .unwrap_err()
            .contains("not valid JSON"));
    }

    #[test]
    fn test_matching_commands() {
        let names: Vec<_> = matching_commands("/p").map(|(name, _)| *name).collect();
        assert_eq!(names, ["/ping", "/pending"]);
        assert_eq!(matching_commands("/").count(), COMMANDS.len());
        assert_eq!(matching_commands("/zzz").count(), 0);
    }

    #[tokio::test]
    async fn test_execute_flow() {
        let (a, _b) = tokio::io::duplex(1024);
        let conn = Connection::new(a);
        let runtime = Handle::current();

        assert!(matches!(execute(&conn, &runtime, "/exit"), Flow::Quit));
        assert!(matches!(execute(&conn, &runtime, "quit"), Flow::Quit));
        assert!(matches!(execute(&conn, &runtime, ""), Flow::Continue));
        assert!(matches!(execute(&conn, &runtime, "/nonsense"), Flow::Continue));
        assert!(matches!(execute(&conn, &runtime, "/stats"), Flow::Continue));
    }
}
