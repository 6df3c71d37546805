//! Line-mode host for a narrative session.
//!
//! A simple line-oriented protocol over stdin/stdout:
//! - Lines starting with `#` are commands (dossier fields, confirm, deploy, ...)
//! - All other lines are sent as player turns once the chat is open
//! - Replies are printed one narrative segment per line

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use volchya_core::dispatch::{CredentialProvider, EnvCredential};
use volchya_core::{
    Message, NarrativeSegment, Role, RosterEntry, Session, SessionConfig, SessionPhase,
    SharedCredential, TurnOutcome,
};

/// Dossier fields settable with `#<field> <value>`.
const DOSSIER_FIELDS: [&str; 5] = ["name", "age", "appearance", "personality", "role"];

/// A key typed with `#key` wins over the environment.
struct HostCredential {
    typed: SharedCredential,
    env: EnvCredential,
}

impl CredentialProvider for HostCredential {
    fn credential(&self) -> Option<String> {
        self.typed.credential().or_else(|| self.env.credential())
    }
}

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Field(&'a str, &'a str),
    Dossier,
    Confirm,
    Roster(&'a str),
    Deploy,
    Key(&'a str),
    History,
    Reset,
    Help,
    Quit,
    Turn(&'a str),
    Unknown(&'a str),
}

/// Parse a trimmed, non-empty input line.
pub fn parse_command(line: &str) -> Command<'_> {
    let Some(rest) = line.strip_prefix('#') else {
        return Command::Turn(line);
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        field if DOSSIER_FIELDS.contains(&field) => Command::Field(field, arg),
        "dossier" => Command::Dossier,
        "confirm" => Command::Confirm,
        "roster" => Command::Roster(arg),
        "deploy" => Command::Deploy,
        "key" => Command::Key(arg),
        "history" => Command::History,
        "reset" => Command::Reset,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other),
    }
}

/// Render one segment as a display line.
pub fn format_segment(segment: &NarrativeSegment) -> String {
    match segment {
        NarrativeSegment::Header(meta) => format!("[HUD] {}", meta.raw),
        NarrativeSegment::Dialogue { speaker, line } => format!("{speaker} | {line}"),
        NarrativeSegment::Monologue { text } => format!("({text})"),
        NarrativeSegment::Narration { text } => text.clone(),
    }
}

fn print_message(message: &Message) {
    match message.role {
        Role::Assistant => {
            for paragraph in volchya_core::narrative::parse_paragraphs(&message.content) {
                for segment in &paragraph {
                    println!("{}", format_segment(segment));
                }
                println!();
            }
        }
        Role::User => println!("[{}] > {}", message.timestamp, message.content),
        Role::System => println!("[NOTICE] {}", message.content),
    }
}

fn print_outcome(outcome: TurnOutcome) {
    match outcome {
        TurnOutcome::Replied(message) => print_message(&message),
        TurnOutcome::Failed(failure) => {
            println!("[NOTICE] {}", failure.kind.notice());
            println!("  ({})", failure.raw_message);
        }
        TurnOutcome::Ignored(reason) => println!("[BUSY] Input ignored: {reason:?}"),
        TurnOutcome::Discarded => {}
    }
}

fn print_roster(roster: &[RosterEntry]) {
    println!("[ROSTER]");
    for entry in roster {
        println!(
            "  {} - {} (age {}, {})",
            entry.display_name(),
            entry.role,
            entry.age,
            entry.height
        );
        if !entry.description.is_empty() {
            println!("    {}", entry.description);
        }
    }
}

fn print_help() {
    println!("[HELP]");
    println!("  #name <value>         - Set your name (required)");
    println!("  #age <value>          - Set your age");
    println!("  #appearance <value>   - Describe your appearance");
    println!("  #personality <value>  - Describe your personality");
    println!("  #role <value>         - Set your role in the organization");
    println!("  #dossier              - Show the dossier");
    println!("  #confirm              - Submit the dossier and open the briefing");
    println!("  #roster [name]        - Show the key personnel, or one of them");
    println!("  #deploy               - Start the session");
    println!("  #key <value>          - Use a different API key");
    println!("  #history              - Show the conversation so far");
    println!("  #reset                - Abandon the session and start over");
    println!("  #quit                 - Exit");
    println!("  (anything else is sent as your turn once deployed)");
}

/// Build a session from the environment and run the line protocol until
/// `#quit` or end of input.
pub async fn run_headless(config: SessionConfig) -> anyhow::Result<()> {
    let typed = SharedCredential::new();
    let credential = HostCredential {
        typed: typed.clone(),
        env: EnvCredential::default(),
    };
    let session = Session::new(
        config,
        Arc::new(volchya_core::GeminiBackend::new()),
        Arc::new(credential),
    )?
    .with_selection_trigger(Arc::new(|| {
        println!("[KEY] Select an API key with #key <value> or set GEMINI_API_KEY.");
    }));

    println!("=== Volchya Staya ===");
    println!("Fill in your dossier, then #confirm and #deploy. Type #help for commands.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line) {
            Command::Field(field, value) => {
                match session.edit_dossier(|d| {
                    d.set_field(field, value);
                }) {
                    Ok(()) => println!("[DOSSIER] {field} = {value}"),
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
            Command::Dossier => {
                println!("[DOSSIER]");
                for (field, value) in session.dossier().fields() {
                    println!("  {field}: {value}");
                }
            }
            Command::Confirm => match session.confirm_dossier() {
                Ok(()) => {
                    print_roster(session.roster());
                    println!("Type #deploy when ready.");
                }
                Err(e) => println!("[ERROR] {e}"),
            },
            Command::Roster("") => print_roster(session.roster()),
            Command::Roster(query) => match volchya_core::find_member(query) {
                Some(entry) => print_roster(std::slice::from_ref(entry)),
                None => println!("[ERROR] No one called {query} on the roster."),
            },
            Command::Deploy => {
                println!("[PROCESSING]");
                stdout.flush().ok();
                match session.deploy().await {
                    Ok(outcome) => print_outcome(outcome),
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
            Command::Key(value) => {
                if value.is_empty() {
                    typed.clear();
                    println!("[KEY] Cleared; using the environment.");
                } else {
                    typed.set(value);
                    println!("[KEY] Updated.");
                }
            }
            Command::History => {
                for message in session.history() {
                    print_message(&message);
                }
            }
            Command::Reset => {
                session.reset();
                println!("[RESET] Back to the dossier.");
            }
            Command::Help => print_help(),
            Command::Quit => {
                println!("Goodbye!");
                break;
            }
            Command::Turn(text) => {
                if session.phase() != SessionPhase::Chat {
                    println!("[ERROR] The session has not been deployed. Type #help for help.");
                } else {
                    println!("[PROCESSING]");
                    stdout.flush().ok();
                    match session.submit(text).await {
                        Ok(outcome) => print_outcome(outcome),
                        Err(e) => println!("[ERROR] {e}"),
                    }
                }
            }
            Command::Unknown(name) => {
                println!("[ERROR] Unknown command #{name}. Type #help for help.");
            }
        }
        stdout.flush().ok();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("#name Anya Sokolova"),
            Command::Field("name", "Anya Sokolova")
        );
        assert_eq!(parse_command("#role   Interpreter "), Command::Field("role", "Interpreter"));
        assert_eq!(parse_command("#deploy"), Command::Deploy);
        assert_eq!(parse_command("#roster"), Command::Roster(""));
        assert_eq!(parse_command("#roster pakhan"), Command::Roster("pakhan"));
        assert_eq!(parse_command("#exit"), Command::Quit);
        assert_eq!(parse_command("#key"), Command::Key(""));
        assert_eq!(parse_command("#dance"), Command::Unknown("dance"));
        assert_eq!(parse_command("I open the door"), Command::Turn("I open the door"));
    }

    #[test]
    fn test_format_segments() {
        let segments = volchya_core::parse("Volk | privet\n[cold]\nSnow falls.");
        let lines: Vec<String> = segments.iter().map(format_segment).collect();
        assert_eq!(lines, ["Volk | privet", "(cold)", "Snow falls."]);
    }
}
