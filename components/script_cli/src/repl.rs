//! REPL (Read-Eval-Print Loop) implementation

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{CliError, CliResult};
use crate::runtime::{InputStatus, Runtime};

const PRIMARY_PROMPT: &str = ">>> ";
const CONTINUATION_PROMPT: &str = "... ";

/// Outcome of a dot command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Keep reading
    Continue,
    /// Leave the REPL
    Exit,
}

/// Run the interactive REPL
///
/// Input that awaits is driven to completion on `executor` before the next
/// prompt.
pub fn run_repl(runtime: &mut Runtime, executor: &tokio::runtime::Runtime) -> CliResult<()> {
    let mut editor = DefaultEditor::new()
        .map_err(|e| CliError::Repl(format!("Failed to initialize editor: {}", e)))?;

    println!("corten-script {}", crate::stdlib::VERSION);
    println!("Type .help for commands, .exit to quit.");

    loop {
        let prompt = if runtime.has_pending_input() {
            CONTINUATION_PROMPT
        } else {
            PRIMARY_PROMPT
        };

        match editor.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if !runtime.has_pending_input() && trimmed.starts_with('.') {
                    if handle_repl_command(trimmed, runtime) == Command::Exit {
                        break;
                    }
                    continue;
                }
                if !trimmed.is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }

                if let InputStatus::Deferred(source) = runtime.input(&line) {
                    // Failures are already reported through the sink.
                    let _ = executor.block_on(runtime.async_run(&source));
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                if runtime.has_pending_input() {
                    println!("^C");
                    runtime.clear_input();
                } else {
                    println!("Press Ctrl-D or type .exit to quit");
                }
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                break;
            }
            Err(err) => {
                return Err(CliError::Repl(format!("Readline error: {}", err)));
            }
        }
    }

    Ok(())
}

/// Handle special REPL commands
pub fn handle_repl_command(command: &str, runtime: &mut Runtime) -> Command {
    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (command, ""),
    };
    match name {
        ".help" => {
            println!("REPL Commands:");
            println!("  .help          - Show this help message");
            println!("  .clear         - Clear the screen and any open block");
            println!("  .names PREFIX  - List names completing PREFIX");
            println!("  .gc            - Run a full collection");
            println!("  .exit          - Exit the REPL");
        }
        ".clear" => {
            runtime.clear_input();
            print!("\x1B[2J\x1B[1;1H");
        }
        ".names" => {
            println!("{}", runtime.complete(argument).join("  "));
        }
        ".gc" => {
            println!("freed {} objects", runtime.collect());
        }
        ".exit" => return Command::Exit,
        _ => {
            println!("Unknown command: {}", command);
            println!("Type .help for available commands");
        }
    }
    Command::Continue
}
