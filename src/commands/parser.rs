/// The two read-only operations over the reasoning log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCommand {
    /// Show the entry `index` places back (1 = latest).
    Fetch { index: usize },
    Summarize { index: usize },
}

impl LogCommand {
    pub fn index(self) -> usize {
        match self {
            Self::Fetch { index } | Self::Summarize { index } => index,
        }
    }
}

/// Parse `/thought [N]` or `/cogito [N]`. A missing index means the latest
/// entry; a malformed or zero index is not a log command.
pub fn parse_command(input: &str) -> Option<LogCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next()?.to_lowercase();
    let args = parts.next().unwrap_or("").trim();

    let index = if args.is_empty() {
        1
    } else {
        match args.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => return None,
        }
    };

    match cmd.as_str() {
        "/thought" => Some(LogCommand::Fetch { index }),
        "/cogito" => Some(LogCommand::Summarize { index }),
        _ => None,
    }
}
