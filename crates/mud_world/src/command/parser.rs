//! Raw input line → [`ParsedCommand`].

/// Switch added by the `;` shorthand: the emote text is glued to the name.
pub const NOSPACE: &str = "nospace";

/// One line of input split into command, switches and arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command_str: String,
    pub switches: Vec<String>,
    pub arguments: Vec<String>,
}

impl ParsedCommand {
    /// Returns `true` if `switch` was given, ignoring case.
    #[must_use]
    pub fn has_switch(&self, switch: &str) -> bool {
        self.switches.iter().any(|s| s.eq_ignore_ascii_case(switch))
    }

    /// The arguments joined by single spaces.
    #[must_use]
    pub fn args_text(&self) -> String {
        self.arguments.join(" ")
    }

    /// Replace this command with `go #<id>`, used when the input named an exit.
    pub fn rewrite_as_go(&mut self, exit: mud_entity::EntityId) {
        self.command_str = "go".to_string();
        self.switches.clear();
        self.arguments = vec![exit.to_string()];
    }
}

/// Parse one line of input.
///
/// `'text` becomes `say text`, `:text` becomes `emote text` and `;text`
/// becomes `emote/nospace text`. For anything else the first word is split on `/` into the command and its
/// switches, and the remaining words are the arguments.
#[must_use]
pub fn parse(raw: &str) -> ParsedCommand {
    let line = raw.trim_start();

    if let Some(rest) = line.strip_prefix('\'') {
        return ParsedCommand {
            command_str: "say".to_string(),
            switches: Vec::new(),
            arguments: words(rest),
        };
    }
    if let Some(rest) = line.strip_prefix(':') {
        return ParsedCommand {
            command_str: "emote".to_string(),
            switches: Vec::new(),
            arguments: words(rest),
        };
    }
    if let Some(rest) = line.strip_prefix(';') {
        return ParsedCommand {
            command_str: "emote".to_string(),
            switches: vec![NOSPACE.to_string()],
            arguments: words(rest),
        };
    }

    let mut tokens = line.split_whitespace();
    let Some(head) = tokens.next() else {
        return ParsedCommand::default();
    };
    let mut parts = head.split('/');
    let command_str = parts.next().unwrap_or_default().to_string();
    let switches = parts
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    ParsedCommand {
        command_str,
        switches,
        arguments: tokens.map(str::to_string).collect(),
    }
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}
