use std::str::FromStr;

use super::ControllerError;

/// A command typed at the gate console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// A car is arriving.
    Entry,
    /// A car is leaving.
    Exit,
    /// Show slot occupancy.
    Status,
    Help,
    /// Stop the console.
    Quit,
}

impl Command {
    pub const HELP: &'static str = "Commands:\n  \
        entry (in)   capture a car arriving and assign a slot\n  \
        exit  (out)  capture a car leaving and free its slot\n  \
        status       show slot occupancy\n  \
        quit         shut down";
}

impl FromStr for Command {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "entry" | "in" => Ok(Self::Entry),
            "exit" | "out" => Ok(Self::Exit),
            "status" => Ok(Self::Status),
            "help" | "?" => Ok(Self::Help),
            "quit" => Ok(Self::Quit),
            _ => Err(ControllerError::UnknownCommand(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("ENTRY".parse::<Command>().unwrap(), Command::Entry);
        assert_eq!("  Exit \n".parse::<Command>().unwrap(), Command::Exit);
        assert_eq!("QuIt".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn parse_aliases() {
        assert_eq!("in".parse::<Command>().unwrap(), Command::Entry);
        assert_eq!("OUT".parse::<Command>().unwrap(), Command::Exit);
        assert_eq!("?".parse::<Command>().unwrap(), Command::Help);
    }

    #[test]
    fn parse_unknown() {
        let err = " park ".parse::<Command>().unwrap_err();
        assert!(matches!(err, ControllerError::UnknownCommand(ref s) if s == "park"));
    }
}
