/**
 * The drive commands that go over the wire. The payload is the bare token,
 * nothing else.
 */
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    MoveForward,
    TurnLeft,
    TurnRight,
    Stop,
}


impl Command {
    pub fn token(&self) -> &'static str {
        match *self {
            Command::MoveForward => "move_forward",
            Command::TurnLeft => "turn_left",
            Command::TurnRight => "turn_right",
            Command::Stop => "stop",
        }
    }

    /**
     * True for everything that makes the wheels turn. Motion commands expire
     * on the robot, so they need to be repeated to keep it going.
     */
    pub fn is_motion(&self) -> bool {
        *self != Command::Stop
    }
}


impl FromStr for Command {
    type Err = Error;

    fn from_str(token: &str) -> Result<Command, Error> {
        match token.trim() {
            "move_forward" => Ok(Command::MoveForward),
            "turn_left" => Ok(Command::TurnLeft),
            "turn_right" => Ok(Command::TurnRight),
            "stop" => Ok(Command::Stop),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}


impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.token())
    }
}


#[cfg(test)]
mod tests {
    use super::Command;
    use crate::error::Error;

    #[test]
    fn test_parse_tokens() {
        for command in [Command::MoveForward, Command::TurnLeft, Command::TurnRight, Command::Stop] {
            match command.token().parse::<Command>() {
                Ok(parsed) => assert!(parsed == command),
                Err(e) => panic!("Unable to parse {}: {}", command, e),
            }
        }
        // Trailing newlines sneak in from some publishers
        assert!("stop\n".parse::<Command>().unwrap() == Command::Stop);
    }

    #[test]
    fn test_parse_unknown() {
        match "forward".parse::<Command>() {
            Err(Error::UnknownCommand(token)) => assert!(token == "forward"),
            _ => panic!("Expected UnknownCommand"),
        }
        assert!("".parse::<Command>().is_err());
        assert!("STOP".parse::<Command>().is_err());
    }

    #[test]
    fn test_is_motion() {
        assert!(Command::MoveForward.is_motion());
        assert!(Command::TurnLeft.is_motion());
        assert!(Command::TurnRight.is_motion());
        assert!(!Command::Stop.is_motion());
    }
}
