use std::str::FromStr;

/// interactive commands read from the terminal while a file is playing
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UserCommand {
    Quit,
    Next,
    /// relative seek in seconds
    Seek(i32),
}

impl UserCommand {
    /// parse one input line; `f`/`b` seek by `step` seconds
    #[must_use]
    pub fn parse_line(line: &str, step: u32) -> Option<UserCommand> {
        let step = i32::try_from(step).unwrap_or(i32::MAX);
        match line.trim() {
            "q" | "Q" | "quit" => Some(UserCommand::Quit),
            "n" | "N" | "next" => Some(UserCommand::Next),
            "f" | "F" => Some(UserCommand::Seek(step)),
            "b" | "B" => Some(UserCommand::Seek(-step)),
            other => other.parse().ok(),
        }
    }
}

impl FromStr for UserCommand {
    type Err = ();

    /// `+N` / `-N` seek by N seconds
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !(s.starts_with('+') || s.starts_with('-')) {
            return Err(());
        }
        match s.parse::<i32>() {
            Ok(0) | Err(_) => Err(()),
            Ok(delta) => Ok(UserCommand::Seek(delta)),
        }
    }
}
