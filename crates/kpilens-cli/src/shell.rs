use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use kpilens_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use kpilens_contracts::validation::UPLOADER_HELP_TEXT;
use kpilens_engine::imaging::load_image;
use kpilens_engine::{Analyzer, BackendKind, DashboardUpload, Settings};

use crate::{display_name, export_report};

#[derive(Debug, Default)]
struct ShellState {
    objective: Option<String>,
    second_objective: Option<String>,
}

impl ShellState {
    fn objective(&self) -> Option<String> {
        self.objective.clone()
    }

    /// Second dashboard objective, falling back to the first.
    fn second_objective(&self) -> Option<String> {
        self.second_objective.clone().or_else(|| self.objective())
    }
}

pub(crate) fn run_shell(
    analyzer: &mut Analyzer,
    settings: &Settings,
    objective: Option<String>,
) -> Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();
    let mut state = ShellState {
        objective: objective.filter(|value| !value.trim().is_empty()),
        second_objective: None,
    };

    println!("kpilens chat started ({}). Type /help for commands.", analyzer.backend_label());

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        if intent.action == "noop" {
            continue;
        }

        match intent.action.as_str() {
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
                println!("Any other text is a question about the current analysis.");
                println!("{UPLOADER_HELP_TEXT}");
            }
            "set_objective" => match intent.arg_str("objective") {
                Some(text) => {
                    state.objective = Some(text.to_string());
                    println!("Objective set.");
                }
                None => println!(
                    "Objective: {}",
                    state.objective.as_deref().unwrap_or("(not set)")
                ),
            },
            "set_second_objective" => match intent.arg_str("objective") {
                Some(text) => {
                    state.second_objective = Some(text.to_string());
                    println!("Second objective set.");
                }
                None => println!(
                    "Second objective: {}",
                    state.second_objective().as_deref().unwrap_or("(not set)")
                ),
            },
            "set_backend" => {
                let Some(raw) = intent.arg_str("backend") else {
                    println!("Backend: {}", analyzer.backend_name());
                    continue;
                };
                match raw.parse::<BackendKind>() {
                    Ok(kind) => match analyzer.switch_backend(kind, settings) {
                        Ok(()) => println!("Backend set. {}", analyzer.backend_label()),
                        Err(err) => println!("Backend switch failed: {err:#}"),
                    },
                    Err(message) => println!("{message}"),
                }
            }
            "analyze" => handle_analyze(analyzer, &state, &intent),
            "validate" => {
                let Some(path) = existing_path(&intent, "/validate") else {
                    continue;
                };
                match load_image(&path) {
                    Ok(image) => {
                        let label = display_name(&path);
                        let valid = analyzer.validate(&image, &label);
                        println!("{label}: {}", if valid { "dashboard" } else { "not a dashboard" });
                    }
                    Err(err) => println!("{err:#}"),
                }
            }
            "compare" => handle_compare(analyzer, &state, &intent),
            "similarity" => {
                let Some((first, second)) = path_pair(&intent, "/similarity") else {
                    continue;
                };
                match (load_image(&first), load_image(&second)) {
                    (Ok(first), Ok(second)) => {
                        let verdict = analyzer.check_similarity(&first, &second);
                        println!("{}", verdict.message());
                    }
                    (Err(err), _) | (_, Err(err)) => println!("{err:#}"),
                }
            }
            "history" => {
                let history = analyzer.context().chat_history();
                if history.is_empty() {
                    println!("No conversation yet.");
                }
                for message in history {
                    println!("{}: {}", message.role.title(), message.text);
                }
            }
            "clear_chat" => {
                analyzer.clear_chat();
                println!("Chat cleared.");
            }
            "status" => print_status(analyzer, &state),
            "report" => {
                let path = intent.arg_str("path").map(PathBuf::from);
                match export_report(analyzer, path.as_deref()) {
                    Ok(Some(_)) => {}
                    Ok(None) => println!("Nothing to report yet. Analyze a dashboard first."),
                    Err(err) => println!("Report failed: {err:#}"),
                }
            }
            "quit" => break,
            "ask" => {
                let question = intent.question.as_deref().unwrap_or_default();
                match analyzer.ask(question) {
                    Ok(answer) => println!("{answer}"),
                    Err(rejection) => println!("{rejection}"),
                }
            }
            _ => {
                let command = intent.arg_str("command").unwrap_or(input.trim());
                println!("Unknown command /{command}. Type /help for commands.");
            }
        }
    }

    Ok(())
}

fn handle_analyze(analyzer: &mut Analyzer, state: &ShellState, intent: &Intent) {
    let Some(path) = existing_path(intent, "/analyze") else {
        return;
    };
    let Some(objective) = state.objective() else {
        println!("Set an objective first with /objective TEXT");
        return;
    };
    let upload = match DashboardUpload::from_path(&path, objective) {
        Ok(upload) => upload,
        Err(err) => {
            println!("{err:#}");
            return;
        }
    };
    match analyzer.analyze(upload) {
        Ok(analysis) => {
            println!("{analysis}\n");
            println!("{}", analyzer.backend_label());
        }
        Err(rejection) => println!("{rejection}"),
    }
}

fn handle_compare(analyzer: &mut Analyzer, state: &ShellState, intent: &Intent) {
    let Some((first_path, second_path)) = path_pair(intent, "/compare") else {
        return;
    };
    let (Some(first_objective), Some(second_objective)) =
        (state.objective(), state.second_objective())
    else {
        println!("Set an objective first with /objective TEXT (and optionally /objective2 TEXT)");
        return;
    };
    let uploads = DashboardUpload::from_path(&first_path, first_objective).and_then(|first| {
        DashboardUpload::from_path(&second_path, second_objective).map(|second| (first, second))
    });
    let (first, second) = match uploads {
        Ok(pair) => pair,
        Err(err) => {
            println!("{err:#}");
            return;
        }
    };
    match analyzer.compare(first, second) {
        Ok(outcome) => {
            println!("{}\n", outcome.similarity_message);
            println!("{}\n", outcome.narrative);
            println!("{}", analyzer.backend_label());
        }
        Err(rejection) => println!("{rejection}"),
    }
}

fn print_status(analyzer: &Analyzer, state: &ShellState) {
    let context = analyzer.context();
    println!("{}", analyzer.backend_label());
    println!(
        "Objective: {}",
        state.objective.as_deref().unwrap_or("(not set)")
    );
    match context.active_session() {
        Some(session) => println!(
            "Active dashboard: {} ({}, {})",
            session.filename,
            session.key.as_str(),
            session.created_at
        ),
        None => println!("No active dashboard."),
    }
    if context.in_comparison_mode() {
        println!("Comparison mode: on");
    }
    println!("Chat messages: {}", context.chat_history().len());
}

fn existing_path(intent: &Intent, command: &str) -> Option<PathBuf> {
    let Some(raw) = intent.arg_str("path") else {
        println!("{command} requires a path");
        return None;
    };
    let path = PathBuf::from(raw);
    if !path.exists() {
        println!("File not found ({})", path.display());
        return None;
    }
    Some(path)
}

fn path_pair(intent: &Intent, command: &str) -> Option<(PathBuf, PathBuf)> {
    let paths = intent.arg_paths();
    let [first, second] = paths.as_slice() else {
        println!("{command} requires exactly two paths");
        return None;
    };
    for raw in [first, second] {
        if !Path::new(raw).exists() {
            println!("File not found ({raw})");
            return None;
        }
    }
    Some((PathBuf::from(first), PathBuf::from(second)))
}
