//! Console command parsing.

use shared::{Category, ObjectId, ParseCategoryError};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Score {
        item_id: ObjectId,
        category: Category,
    },
    Grab(ObjectId),
    Release(ObjectId),
    Move {
        object_id: ObjectId,
        position: [f32; 3],
    },
    Status,
    Objects,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("missing argument <{0}>")]
    MissingArgument(&'static str),
    #[error("not a number: {0}")]
    InvalidNumber(String),
    #[error(transparent)]
    InvalidCategory(#[from] ParseCategoryError),
}

pub const HELP: &str = "commands: start | score <item> <category> | grab <id> | release <id> | \
move <id> <x> <y> <z> | status | objects | quit";

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(CommandError::Empty)?;

        let command = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "score" => Command::Score {
                item_id: number(words.next(), "item")?,
                category: words
                    .next()
                    .ok_or(CommandError::MissingArgument("category"))?
                    .parse()?,
            },
            "grab" => Command::Grab(number(words.next(), "id")?),
            "release" => Command::Release(number(words.next(), "id")?),
            "move" => Command::Move {
                object_id: number(words.next(), "id")?,
                position: [
                    number(words.next(), "x")?,
                    number(words.next(), "y")?,
                    number(words.next(), "z")?,
                ],
            },
            "status" => Command::Status,
            "objects" | "ls" => Command::Objects,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(command)
    }
}

fn number<T: FromStr>(word: Option<&str>, name: &'static str) -> Result<T, CommandError> {
    let word = word.ok_or(CommandError::MissingArgument(name))?;
    word.parse()
        .map_err(|_| CommandError::InvalidNumber(word.to_string()))
}
