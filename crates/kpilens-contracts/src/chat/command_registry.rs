#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "objective",
        action: "set_objective",
    },
    CommandSpec {
        command: "objective2",
        action: "set_second_objective",
    },
    CommandSpec {
        command: "backend",
        action: "set_backend",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "analyze",
        action: "analyze",
    },
    CommandSpec {
        command: "validate",
        action: "validate",
    },
];

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "compare",
        action: "compare",
    },
    CommandSpec {
        command: "similarity",
        action: "similarity",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "history",
        action: "history",
    },
    CommandSpec {
        command: "clear",
        action: "clear_chat",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const REPORT_COMMAND: CommandSpec = CommandSpec {
    command: "report",
    action: "report",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/objective",
    "/objective2",
    "/backend",
    "/analyze",
    "/validate",
    "/compare",
    "/similarity",
    "/history",
    "/clear",
    "/status",
    "/report",
    "/help",
    "/quit",
];
