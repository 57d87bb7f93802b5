mod services;

use std::env;
use std::io::{self, BufRead, Write};

use crate::services::config::Config;
use crate::services::formatter::ResponseFormatter;
use crate::services::interceptor::{CommandInterceptor, InterceptOutcome};
use crate::services::interrupt;
use crate::services::session::Session;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit status the shells use for "command not found".
const EXIT_NOT_FOUND: i32 = 127;

fn print_help() {
    println!("xonai {} - natural language for your shell's command-not-found hook", VERSION);
    println!();
    println!("USAGE:");
    println!("    xonai [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help              Print help information");
    println!("    -v, --version           Print version information");
    println!("    --handle <TOKENS>...    Handle a command the shell could not find");
    println!("                            (exit 127 when left to the shell)");
    println!("    --prompt <TEXT>         Send prompt to the agent and stream the answer");
    println!("    --chat                  Read prompts from stdin, one per line");
    println!("    --init <bash|zsh|fish>  Print the shell hook to add to your rc file");
    println!();
    println!("ENVIRONMENT:");
    println!("    XONAI_DUMMY=1           Use the offline dummy agent");
    println!("    XONAI_SESSION_ID        Continue an existing Claude session");
    println!("    XONAI_DUMMY_DELAY_MS    Delay between dummy events (default 50)");
    println!("    XONAI_DEBUG=1           Write debug logs to ~/.xonai/debug/");
}

fn print_version() {
    println!("xonai {}", VERSION);
}

fn shell_hook(shell: &str) -> Option<&'static str> {
    match shell {
        "bash" => Some("command_not_found_handle() {\n    xonai --handle \"$@\"\n}"),
        "zsh" => Some("command_not_found_handler() {\n    xonai --handle \"$@\"\n}"),
        "fish" => Some("function fish_command_not_found\n    xonai --handle $argv\nend"),
        _ => None,
    }
}

fn make_interceptor(config: &Config) -> CommandInterceptor<'static, io::Stdout> {
    interrupt::install();
    let session = Session::new(config.session_id.clone());
    CommandInterceptor::new(config.make_backend(), ResponseFormatter::stdout(), session)
        .with_cancel(interrupt::token())
}

fn handle_command(tokens: &[String]) -> i32 {
    let config = Config::from_env();
    let mut interceptor = make_interceptor(&config);
    match interceptor.handle(tokens) {
        InterceptOutcome::Handled => 0,
        InterceptOutcome::NotHandled => {
            let name = tokens.first().map(String::as_str).unwrap_or("");
            eprintln!("{}: command not found", name);
            EXIT_NOT_FOUND
        }
    }
}

fn handle_prompt(prompt: &str) {
    let config = Config::from_env();
    let mut interceptor = make_interceptor(&config);
    interceptor.run_query(prompt);
}

fn handle_chat() {
    let config = Config::from_env();
    let mut interceptor = make_interceptor(&config);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("Error: failed to read input: {}", e);
                break;
            }
            None => break,
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "exit" || query == "quit" {
            break;
        }
        interceptor.run_query(query);
    }
    println!();
}

fn main() {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("-h") | Some("--help") => print_help(),
        Some("-v") | Some("--version") => print_version(),
        Some("--handle") => {
            let code = handle_command(&args[2..]);
            std::process::exit(code);
        }
        Some("--prompt") => {
            if args.len() < 3 {
                eprintln!("Error: --prompt requires a text argument");
                eprintln!("Usage: xonai --prompt \"your question\"");
                std::process::exit(1);
            }
            handle_prompt(&args[2..].join(" "));
        }
        Some("--chat") => handle_chat(),
        Some("--init") => {
            let shell = args.get(2).map(String::as_str).unwrap_or("");
            match shell_hook(shell) {
                Some(hook) => println!("{}", hook),
                None => {
                    eprintln!("Error: --init requires one of: bash, zsh, fish");
                    eprintln!("Usage: eval \"$(xonai --init bash)\"");
                    std::process::exit(1);
                }
            }
        }
        Some(arg) => {
            eprintln!("Unknown option: {}", arg);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
        // No arguments provided
        None => print_help(),
    }
}
