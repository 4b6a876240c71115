/// Available commands and autocomplete logic

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "posts",
    aliases: &["p", "list"],
    description: "Paginated post list",
  },
  Command {
    name: "infinite",
    aliases: &["i", "inf", "scroll"],
    description: "Endless post list",
  },
  Command {
    name: "new",
    aliases: &["n", "create"],
    description: "Write a new post",
  },
  Command {
    name: "cache",
    aliases: &["inspect", "queries"],
    description: "Inspect the query cache",
  },
  Command {
    name: "clear",
    aliases: &["reset"],
    description: "Drop every cached query",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit postdeck",
  },
];

/// Command whose name or alias is exactly `input`
pub fn find(input: &str) -> Option<&'static Command> {
  let input = input.trim().to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == input || cmd.aliases.contains(&input.as_str()))
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input_lower).map(|priority| (cmd, priority)))
    .collect();

  // Stable, so ties keep declaration order
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Lower is better; None means no match
fn rank(cmd: &Command, input: &str) -> Option<u32> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}
