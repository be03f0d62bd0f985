use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, MULTI_PATH_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, REPORT_COMMAND,
    SINGLE_PATH_COMMANDS,
};

/// One line of shell input resolved to an action.
///
/// Plain text becomes an `ask` intent carrying the question; slash commands
/// resolve through the command registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub question: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            question: None,
            command_args: BTreeMap::new(),
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn arg_paths(&self) -> Vec<String> {
        self.command_args
            .get("paths")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

fn raw_arg_key(action: &str) -> &'static str {
    match action {
        "set_backend" => "backend",
        _ => "objective",
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    raw_arg_key(action).to_string(),
                    Value::String(arg.to_string()),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, MULTI_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "paths".to_string(),
                    Value::Array(
                        parse_path_args(arg)
                            .into_iter()
                            .map(Value::String)
                            .collect(),
                    ),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            if command == REPORT_COMMAND.command {
                let mut intent = Intent::new(REPORT_COMMAND.action, text);
                let path = parse_single_path_arg(arg);
                intent.command_args.insert(
                    "path".to_string(),
                    if path.is_empty() {
                        Value::Null
                    } else {
                        Value::String(path)
                    },
                );
                return intent;
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("ask", text);
    intent.question = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::parse_intent;

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
        assert_eq!(parse_intent("").action, "noop");
    }

    #[test]
    fn plain_text_becomes_question() {
        let intent = parse_intent("  Why did revenue dip in March?  ");
        assert_eq!(intent.action, "ask");
        assert_eq!(
            intent.question.as_deref(),
            Some("Why did revenue dip in March?")
        );
    }

    #[test]
    fn objective_keeps_raw_text() {
        let intent = parse_intent("/objective  Track revenue, churn and CAC per region ");
        assert_eq!(intent.action, "set_objective");
        assert_eq!(
            intent.arg_str("objective"),
            Some("Track revenue, churn and CAC per region")
        );

        let second = parse_intent("/objective2 Monitor headcount");
        assert_eq!(second.action, "set_second_objective");
        assert_eq!(second.arg_str("objective"), Some("Monitor headcount"));
    }

    #[test]
    fn backend_command_reads_name() {
        let intent = parse_intent("/backend ollama");
        assert_eq!(intent.action, "set_backend");
        assert_eq!(intent.arg_str("backend"), Some("ollama"));
    }

    #[test]
    fn analyze_accepts_quoted_path() {
        let intent = parse_intent("/analyze \"/tmp/q3 sales.png\"");
        assert_eq!(intent.action, "analyze");
        assert_eq!(intent.command_args["path"], json!("/tmp/q3 sales.png"));
    }

    #[test]
    fn compare_collects_two_paths() {
        let intent = parse_intent("/compare \"/tmp/a b.png\" c.png");
        assert_eq!(intent.action, "compare");
        assert_eq!(intent.arg_paths(), vec!["/tmp/a b.png", "c.png"]);
    }

    #[test]
    fn report_path_is_optional() {
        let bare = parse_intent("/report");
        assert_eq!(bare.action, "report");
        assert_eq!(bare.command_args["path"], Value::Null);

        let explicit = parse_intent("/report out/q3.md");
        assert_eq!(explicit.command_args["path"], json!("out/q3.md"));
    }

    #[test]
    fn exit_aliases_quit() {
        assert_eq!(parse_intent("/exit").action, "quit");
        assert_eq!(parse_intent("/QUIT").action, "quit");
        assert_eq!(parse_intent("/clear").action, "clear_chat");
    }

    #[test]
    fn unknown_command_keeps_arguments() {
        let intent = parse_intent("/forecast next quarter");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("forecast"));
        assert_eq!(intent.command_args["arg"], json!("next quarter"));
    }
}
