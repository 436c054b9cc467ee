use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::app::{parse_field_value, AppError};
use crate::autosave::SaveOutcome;
use crate::clock::Clock;
use crate::session::Session;
use crate::store::KeyValueStore;
use crate::ui::status_label;

const HELP: &str = "\
commands:
  set POINTER VALUE    change a field (VALUE is JSON or plain text)
  add POINTER          append a record to the list at POINTER
  del POINTER ID       remove the record with ID from the list at POINTER
  show                 print the document being edited
  save                 save now
  status               show the save status
  :q                   save and quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorCommand {
    Set { pointer: String, value: String },
    Add { pointer: String },
    Del { pointer: String, record_id: String },
    Show,
    Save,
    Status,
    Help,
    Quit,
}

impl EditorCommand {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let command = match verb {
            "set" => {
                let (pointer, value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: set POINTER VALUE".to_string())?;
                EditorCommand::Set {
                    pointer: pointer.to_string(),
                    value: value.trim().to_string(),
                }
            }
            "add" if !rest.is_empty() => EditorCommand::Add {
                pointer: rest.to_string(),
            },
            "add" => return Err("usage: add POINTER".to_string()),
            "del" => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(pointer), Some(record_id), None) => EditorCommand::Del {
                        pointer: pointer.to_string(),
                        record_id: record_id.to_string(),
                    },
                    _ => return Err("usage: del POINTER ID".to_string()),
                }
            }
            "show" => EditorCommand::Show,
            "save" => EditorCommand::Save,
            "status" => EditorCommand::Status,
            "help" | "?" => EditorCommand::Help,
            ":q" | "quit" | "exit" => EditorCommand::Quit,
            other => return Err(format!("unknown command '{other}'; try help")),
        };
        Ok(Some(command))
    }
}

/// Forwards stdin lines to a channel so the edit loop can wait on input and
/// the autosave deadline at the same time.
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Runs until `:q` or end of input, then performs the trailing save. Command
/// errors are reported and editing continues.
pub fn run_editor<S: KeyValueStore, C: Clock>(
    session: &mut Session<S, C>,
    lines: &Receiver<String>,
    out: &mut impl Write,
) -> Result<SaveOutcome, AppError> {
    if let Some(id) = session.current_case_id() {
        writeln!(out, "editing {id} (help for commands, :q to quit)")?;
    }
    loop {
        let received = match time_until_deadline(session) {
            Some(wait) => lines.recv_timeout(wait),
            None => lines.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(line) => {
                let command = match EditorCommand::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(message) => {
                        writeln!(out, "{message}")?;
                        continue;
                    }
                };
                if command == EditorCommand::Quit {
                    break;
                }
                apply(session, command, out)?;
            }
            Err(RecvTimeoutError::Timeout) => match session.tick() {
                Ok(SaveOutcome::Written { last_modified, .. }) => writeln!(
                    out,
                    "autosaved at {}",
                    last_modified.as_deref().unwrap_or("unknown time")
                )?,
                Ok(_) => {}
                Err(err) => writeln!(out, "autosave failed: {err}")?,
            },
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let outcome = session.close()?;
    if matches!(outcome, SaveOutcome::Written { .. }) {
        writeln!(out, "saved")?;
    }
    Ok(outcome)
}

fn time_until_deadline<S: KeyValueStore, C: Clock>(session: &Session<S, C>) -> Option<Duration> {
    let deadline = session.next_deadline()?;
    let remaining = deadline - session.now();
    Some(Duration::try_from(remaining).unwrap_or(Duration::ZERO))
}

fn apply<S: KeyValueStore, C: Clock>(
    session: &mut Session<S, C>,
    command: EditorCommand,
    out: &mut impl Write,
) -> io::Result<()> {
    match command {
        EditorCommand::Set { pointer, value } => {
            if let Err(err) = session.set_field(&pointer, parse_field_value(&value)) {
                writeln!(out, "{err}")?;
            }
        }
        EditorCommand::Add { pointer } => match session.append_record(&pointer) {
            Ok(record_id) => writeln!(out, "added {record_id}")?,
            Err(err) => writeln!(out, "{err}")?,
        },
        EditorCommand::Del { pointer, record_id } => {
            match session.remove_record(&pointer, &record_id) {
                Ok(true) => writeln!(out, "removed {record_id}")?,
                Ok(false) => writeln!(out, "no record {record_id} at {pointer}")?,
                Err(err) => writeln!(out, "{err}")?,
            }
        }
        EditorCommand::Show => match session.document().map(|doc| doc.to_pretty()) {
            Some(Ok(text)) => writeln!(out, "{text}")?,
            Some(Err(err)) => writeln!(out, "{err}")?,
            None => writeln!(out, "no case is open")?,
        },
        EditorCommand::Save => match session.save_now() {
            Ok(SaveOutcome::Written { .. }) => writeln!(out, "saved")?,
            Ok(_) => writeln!(out, "nothing to save")?,
            Err(err) => writeln!(out, "{err}")?,
        },
        EditorCommand::Status => writeln!(out, "{}", status_label(&session.status()))?,
        EditorCommand::Help => writeln!(out, "{HELP}")?,
        EditorCommand::Quit => {}
    }
    Ok(())
}
