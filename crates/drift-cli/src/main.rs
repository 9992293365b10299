use std::{
    io::{self, Write},
    process::ExitCode,
};

use drift::{Session, StdPrint};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        // File execution mode
        let path = &args[1];
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("Error reading {path}: {err}");
                return ExitCode::FAILURE;
            }
        };
        let mut session = Session::new();
        return match session.run_source(&source, &mut StdPrint) {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{err}");
                ExitCode::FAILURE
            }
        };
    }

    // Interactive mode
    let mut session = Session::new();
    let mut source = String::new();

    loop {
        let prompt = if source.is_empty() { ">> " } else { ".. " };
        let Some(line) = read_line(prompt) else {
            println!();
            break;
        };

        if source.is_empty() && line.trim().is_empty() {
            continue;
        }

        if !source.is_empty() {
            source.push('\n');
        }
        source.push_str(&line);

        if needs_more_input(&source) {
            continue;
        }

        execute_snippet(&mut session, &source);
        source.clear();
    }

    ExitCode::SUCCESS
}

/// Executes one snippet, streaming `puts` output and printing the final
/// value or the failing stage's errors.
fn execute_snippet(session: &mut Session, source: &str) {
    let outcome = session.execute_with(source, &mut StdPrint);
    if let Some(result) = outcome.result {
        println!("{result}");
    }
    if let Some(errors) = outcome.parser_errors {
        eprintln!("parser errors:");
        for error in errors {
            eprintln!("\t{error}");
        }
    }
    if let Some(error) = outcome.compiler_error {
        eprintln!("compiler error: {error}");
    }
    if let Some(error) = outcome.runtime_error {
        eprintln!("runtime error: {error}");
    }
}

/// Heuristic multiline detector for interactive input.
fn needs_more_input(source: &str) -> bool {
    let mut balance = 0i32;
    let mut in_string = false;
    for ch in source.chars() {
        match ch {
            '"' => in_string = !in_string,
            '(' | '[' | '{' if !in_string => balance += 1,
            ')' | ']' | '}' if !in_string => balance -= 1,
            _ => {}
        }
    }
    balance > 0
}

/// Reads one line from stdin after printing a prompt.
///
/// Returns `None` on EOF (Ctrl+D).
fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    if io::stdout().flush().is_err() {
        return None;
    }
    let mut input = String::new();
    let read = io::stdin().read_line(&mut input).ok()?;
    if read == 0 {
        return None;
    }
    Some(input.trim_end_matches(['\r', '\n']).to_owned())
}
