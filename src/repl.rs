//! Interactive REPL: one line at a time until EOF.

use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::SkiffError;
use crate::Vm;

const HISTORY_FILE: &str = ".skiff_history";

fn history_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(HISTORY_FILE),
        None => PathBuf::from(HISTORY_FILE),
    }
}

/// Run the line loop. A single VM lives for the whole session, so globals
/// defined on one line are visible on the next; errors are printed and
/// the loop continues.
pub fn run() {
    let mut vm = Vm::new();
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("could not start line editor: {}", err);
            return;
        }
    };
    let history = history_path();
    let _ = editor.load_history(&history);

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == ".exit" || line == ".quit" {
                    break;
                }
                if line == ".help" {
                    print_help();
                    continue;
                }
                let _ = editor.add_history_entry(line);
                match vm.interpret(line) {
                    Ok(()) => {}
                    Err(SkiffError::Compile(err)) => eprintln!("{}", err),
                    Err(SkiffError::Runtime(err)) => eprintln!("{}", err.render()),
                    Err(SkiffError::Io(err)) => eprintln!("IO error: {}", err),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("error: {}", err);
                break;
            }
        }
    }

    let _ = editor.save_history(&history);
}

fn print_help() {
    println!("Commands:");
    println!("  .help        Show this message");
    println!("  .exit        Leave the REPL (also .quit or ctrl-d)");
    println!();
    println!("Anything else is interpreted as Skiff source, one line at a time.");
    println!("Globals persist across lines.");
}
