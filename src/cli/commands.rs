use std::fmt::Write as _;
use std::io::{self, BufRead, Write as _};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crate::gateway::{Authenticator, LocalGateway, RemoteGateway};
use crate::note::NoteDraft;
use crate::session::{FormMode, NoteSession, SubmitOutcome};

#[derive(Args, Debug, Clone, Default)]
pub struct ShellArgs {
    /// Spawn a background peer client of the same account, so live
    /// subscription updates are visible without a second terminal
    #[arg(long)]
    pub peer: bool,
    /// Seconds between peer actions
    #[arg(long, default_value_t = 3)]
    pub peer_interval: u64,
}

/// One parsed shell line. The shell is the view collaborator: it forwards
/// intents to the session and renders the store, nothing more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Help,
    List,
    Json,
    /// Create in one step: set the form text and submit.
    Add(String),
    /// Load a note into the form by list position or id prefix.
    Edit(String),
    /// Replace the form text without submitting.
    Text(String),
    Submit,
    /// Discard the selection and form ("new note").
    New,
    Delete(String),
    /// Drain pending subscription events.
    Sync,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let trimmed = line.trim();
    let (verb, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (trimmed, ""),
    };
    let needs_arg = |cmd: fn(String) -> ShellCommand| {
        if rest.is_empty() {
            Err(format!("'{verb}' needs an argument"))
        } else {
            Ok(cmd(rest.to_string()))
        }
    };
    match verb {
        "help" | "?" => Ok(ShellCommand::Help),
        "list" | "ls" => Ok(ShellCommand::List),
        "json" => Ok(ShellCommand::Json),
        "add" => needs_arg(ShellCommand::Add),
        "edit" => needs_arg(ShellCommand::Edit),
        "text" => needs_arg(ShellCommand::Text),
        "submit" => Ok(ShellCommand::Submit),
        "new" => Ok(ShellCommand::New),
        "delete" | "rm" => needs_arg(ShellCommand::Delete),
        "sync" => Ok(ShellCommand::Sync),
        "quit" | "exit" | "q" => Ok(ShellCommand::Quit),
        "" => Err("empty command; try 'help'".to_string()),
        other => Err(format!("unknown command '{other}'; try 'help'")),
    }
}

/// Maps a user-supplied target (1-based list position or unambiguous id
/// prefix) to a note id.
pub fn resolve_target(session: &NoteSession, target: &str) -> Result<String, String> {
    if let Ok(position) = target.parse::<usize>() {
        return session
            .notes()
            .nth(position.saturating_sub(1))
            .filter(|_| position >= 1)
            .map(|note| note.id.clone())
            .ok_or_else(|| format!("no note at position {position}"));
    }

    let matches: Vec<&str> = session
        .notes()
        .filter(|note| note.id.starts_with(target))
        .map(|note| note.id.as_str())
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).to_string()),
        [] => Err(format!("no note with id starting '{target}'")),
        _ => Err(format!("id prefix '{target}' is ambiguous")),
    }
}

pub fn format_note_list(session: &NoteSession) -> String {
    if session.store().is_empty() {
        return "No notes yet. 'add <text>' creates one.\n".to_string();
    }
    let editing = match session.mode() {
        FormMode::Editing(id) => Some(id),
        FormMode::Composing => None,
    };
    let mut out = String::new();
    for (index, note) in session.notes().enumerate() {
        let marker = if editing.as_deref() == Some(note.id.as_str()) {
            '*'
        } else {
            ' '
        };
        let short = note.id.get(..8).unwrap_or(&note.id);
        let _ = writeln!(&mut out, "{marker}{:>3}  {short}  {}", index + 1, note.text);
    }
    out
}

fn format_prompt(session: &NoteSession) -> String {
    match session.mode() {
        FormMode::Composing => format!("{} (compose)> ", session.username()),
        FormMode::Editing(id) => {
            let short = id.get(..8).unwrap_or(&id);
            format!("{} (editing {short})> ", session.username())
        }
    }
}

const HELP: &str = "\
Commands:
  list            show the note list ('*' marks the note being edited)
  json            dump the note list as JSON
  add <text>      create a note
  edit <n|id>     load a note into the form by position or id prefix
  text <text>     replace the form text
  submit          create or update, depending on the form mode
  new             discard the form and selection
  delete <n|id>   delete a note
  sync            apply pending live updates
  quit            exit
";

/// Applies one command to the session and returns the text to print, or
/// `None` to exit the shell.
pub fn execute(session: &mut NoteSession, command: ShellCommand) -> Result<Option<String>> {
    let output = match command {
        ShellCommand::Help => HELP.to_string(),
        ShellCommand::List => format_note_list(session),
        ShellCommand::Json => {
            let mut json = serde_json::to_string_pretty(&session.store().to_vec())
                .context("serialising note list")?;
            json.push('\n');
            json
        }
        ShellCommand::Add(text) => {
            session.start_new();
            session.set_text(text);
            match session.submit() {
                Ok(SubmitOutcome::Created(note)) => format!("Created {}\n", note.id),
                Ok(SubmitOutcome::Updated(note)) => format!("Updated {}\n", note.id),
                Err(err) => format!("Add failed: {err:#}\n"),
            }
        }
        ShellCommand::Edit(target) => match resolve_target(session, &target) {
            Ok(id) => {
                session.select_note(&id);
                format!("Editing {}: {}\n", id, session.text())
            }
            Err(message) => format!("{message}\n"),
        },
        ShellCommand::Text(text) => {
            session.set_text(text);
            String::new()
        }
        ShellCommand::Submit => match session.submit() {
            Ok(SubmitOutcome::Created(note)) => format!("Created {}\n", note.id),
            Ok(SubmitOutcome::Updated(note)) => format!("Updated {}\n", note.id),
            Err(err) => format!("Submit failed: {err:#}\n"),
        },
        ShellCommand::New => {
            session.start_new();
            String::new()
        }
        ShellCommand::Delete(target) => match resolve_target(session, &target) {
            Ok(id) => match session.delete_note(&id) {
                Ok(()) => format!("Deleted {id}\n"),
                Err(err) => format!("Delete failed: {err:#}\n"),
            },
            Err(message) => format!("{message}\n"),
        },
        ShellCommand::Sync => {
            let applied = session.pump();
            format!("Applied {applied} event(s)\n")
        }
        ShellCommand::Quit => return Ok(None),
    };
    Ok(Some(output))
}

pub fn run_shell(mut session: NoteSession, gateway: LocalGateway, args: ShellArgs) -> Result<()> {
    if args.peer {
        spawn_peer(&gateway, Duration::from_secs(args.peer_interval.max(1)));
        println!("Peer client active; 'sync' pulls in its changes.");
    }

    println!("Signed in as {}. Type 'help' for commands.", session.username());
    print!("{}", format_note_list(&session));

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        // Reconcile anything that arrived while the prompt was idle, so the
        // list and the form-mode marker are current before each command.
        let applied = session.pump();
        if applied > 0 {
            println!("({applied} live update(s) applied)");
        }

        print!("{}", format_prompt(&session));
        io::stdout().flush().context("flushing prompt")?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("reading shell input")?;

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        match execute(&mut session, command)? {
            Some(output) => print!("{output}"),
            None => break,
        }
    }

    session.close();
    Ok(())
}

/// A second client of the same account running on its own thread: creates,
/// edits, and deletes notes so the main session has live events to
/// reconcile. Detached; it dies with the process.
fn spawn_peer(gateway: &LocalGateway, interval: Duration) {
    let Ok(identity) = gateway.current_user() else {
        return;
    };
    let peer = gateway.client_for(identity.username);
    thread::spawn(move || {
        let mut round = 0u32;
        let mut last_id: Option<String> = None;
        loop {
            thread::sleep(interval);
            round += 1;
            let result = match round % 3 {
                1 => peer
                    .create_note(&NoteDraft::new(format!("peer note #{round}")))
                    .map(|note| last_id = Some(note.id)),
                2 => match &last_id {
                    Some(id) => peer
                        .update_note(id, &NoteDraft::new(format!("peer edit #{round}")))
                        .map(|_| ()),
                    None => Ok(()),
                },
                _ => match last_id.take() {
                    Some(id) => peer.delete_note(&id).map(|_| ()),
                    None => Ok(()),
                },
            };
            if let Err(err) = result {
                tracing::warn!(?err, "peer action failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn session_with(texts: &[&str]) -> NoteSession {
        let gateway = LocalGateway::new("alice");
        gateway.seed(texts.iter().copied());
        NoteSession::start(Arc::new(gateway.clone()), &gateway).expect("session starts")
    }

    #[test]
    fn parse_recognises_every_verb() {
        assert_eq!(parse_command("help"), Ok(ShellCommand::Help));
        assert_eq!(parse_command("ls"), Ok(ShellCommand::List));
        assert_eq!(
            parse_command("add buy milk"),
            Ok(ShellCommand::Add("buy milk".to_string()))
        );
        assert_eq!(parse_command("edit 2"), Ok(ShellCommand::Edit("2".to_string())));
        assert_eq!(
            parse_command("  text  spaced out  "),
            Ok(ShellCommand::Text("spaced out".to_string()))
        );
        assert_eq!(parse_command("submit"), Ok(ShellCommand::Submit));
        assert_eq!(parse_command("rm 1"), Ok(ShellCommand::Delete("1".to_string())));
        assert_eq!(parse_command("sync"), Ok(ShellCommand::Sync));
        assert_eq!(parse_command("q"), Ok(ShellCommand::Quit));
    }

    #[test]
    fn parse_rejects_missing_arguments_and_unknown_verbs() {
        assert!(parse_command("add").is_err());
        assert!(parse_command("edit   ").is_err());
        assert!(parse_command("frobnicate").is_err());
        assert!(parse_command("").is_err());
    }

    #[test]
    fn resolve_target_by_position_and_prefix() {
        let session = session_with(&["a", "b"]);
        let ids: Vec<String> = session.notes().map(|n| n.id.clone()).collect();

        assert_eq!(resolve_target(&session, "1").unwrap(), ids[0]);
        assert_eq!(resolve_target(&session, "2").unwrap(), ids[1]);
        assert!(resolve_target(&session, "0").is_err());
        assert!(resolve_target(&session, "3").is_err());

        let prefix = &ids[0][..8];
        // uuid v4 prefixes of this length are unique across two notes in
        // practice; fall back to the full id if not.
        let resolved = resolve_target(&session, prefix)
            .or_else(|_| resolve_target(&session, &ids[0]))
            .unwrap();
        assert_eq!(resolved, ids[0]);
    }

    #[test]
    fn add_then_edit_then_submit_round_trip() {
        let mut session = session_with(&[]);

        let out = execute(&mut session, ShellCommand::Add("first".into()))
            .unwrap()
            .unwrap();
        assert!(out.starts_with("Created "));

        execute(&mut session, ShellCommand::Edit("1".into()))
            .unwrap()
            .unwrap();
        assert!(matches!(session.mode(), FormMode::Editing(_)));

        execute(&mut session, ShellCommand::Text("first, edited".into()))
            .unwrap()
            .unwrap();
        let out = execute(&mut session, ShellCommand::Submit).unwrap().unwrap();
        assert!(out.starts_with("Updated "));
        assert_eq!(session.notes().next().unwrap().text, "first, edited");
    }

    #[test]
    fn list_marks_the_note_being_edited() {
        let mut session = session_with(&["alpha", "beta"]);
        execute(&mut session, ShellCommand::Edit("2".into()))
            .unwrap()
            .unwrap();

        let listing = format_note_list(&session);
        let lines: Vec<&str> = listing.lines().collect();
        assert!(lines[0].starts_with(' '));
        assert!(lines[1].starts_with('*'));
        assert!(lines[1].contains("beta"));
    }

    #[test]
    fn json_output_is_valid_and_complete() {
        let mut session = session_with(&["alpha"]);
        let out = execute(&mut session, ShellCommand::Json).unwrap().unwrap();
        let notes: Vec<crate::note::Note> = serde_json::from_str(&out).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "alpha");
    }

    #[test]
    fn failed_submit_is_reported_not_fatal() {
        let mut session = session_with(&[]);
        let out = execute(&mut session, ShellCommand::Submit).unwrap().unwrap();
        assert!(out.starts_with("Submit failed:"));
    }

    #[test]
    fn quit_ends_the_loop() {
        let mut session = session_with(&[]);
        assert!(execute(&mut session, ShellCommand::Quit).unwrap().is_none());
    }

    #[test]
    fn peer_identity_matches_the_session_owner() {
        let gateway = LocalGateway::new("alice");
        let identity = gateway.current_user().unwrap();
        assert_eq!(identity.username, "alice");
    }
}
