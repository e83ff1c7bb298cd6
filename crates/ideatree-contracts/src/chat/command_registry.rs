#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "model",
        action: "set_model",
    },
];

pub(crate) const NODE_REF_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "expand",
        action: "expand",
    },
    CommandSpec {
        command: "remove",
        action: "remove",
    },
    CommandSpec {
        command: "rm",
        action: "remove",
    },
    CommandSpec {
        command: "favorite",
        action: "favorite",
    },
    CommandSpec {
        command: "fav",
        action: "favorite",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "tree",
        action: "show_tree",
    },
    CommandSpec {
        command: "favorites",
        action: "show_favorites",
    },
    CommandSpec {
        command: "report",
        action: "report",
    },
    CommandSpec {
        command: "analysis",
        action: "analysis",
    },
    CommandSpec {
        command: "countries",
        action: "show_countries",
    },
    CommandSpec {
        command: "ping",
        action: "ping",
    },
    CommandSpec {
        command: "clear",
        action: "clear",
    },
    CommandSpec {
        command: "help",
        action: "help",
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

pub(crate) const EXPORT_COMMAND: CommandSpec = CommandSpec {
    command: "export",
    action: "export",
};

pub(crate) const RECIPE_COMMAND: CommandSpec = CommandSpec {
    command: "recipe",
    action: "recipe",
};

pub(crate) const COUNTRY_FLAGS: &[&str] = &["--countries", "--country", "-c"];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/generate <keyword>",
    "/expand <path|@id>",
    "/remove <path|@id>",
    "/favorite <path|@id>",
    "/favorites",
    "/tree",
    "/report",
    "/analysis",
    "/export [file]",
    "/recipe <concept> --countries <a,b>",
    "/countries",
    "/model <name>",
    "/ping",
    "/clear",
    "/help",
    "/quit",
];
