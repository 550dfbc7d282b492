//! Line commands read from stdin.

use kurbo::Point;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  draw x,y x,y ...   draw a stroke through the given points
  undo | redo        step through your own strokes
  clear              clear the canvas for everyone
  show               print the canvas
  share              look for a session to join
  leave              leave the current session
  quit               exit";

#[derive(Debug, Clone, PartialEq)]
pub enum PeerCommand {
    Draw(Vec<Point>),
    Undo,
    Redo,
    Clear,
    Show,
    Share,
    Leave,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),
    #[error("invalid point `{0}`, expected x,y")]
    InvalidPoint(String),
    #[error("draw needs at least one point")]
    NoPoints,
}

pub fn parse(line: &str) -> Result<PeerCommand, ParseError> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Err(ParseError::Empty);
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "draw" | "d" => {
            let points = words.map(parse_point).collect::<Result<Vec<_>, _>>()?;
            if points.is_empty() {
                return Err(ParseError::NoPoints);
            }
            return Ok(PeerCommand::Draw(points));
        }
        "undo" | "u" => PeerCommand::Undo,
        "redo" | "r" => PeerCommand::Redo,
        "clear" => PeerCommand::Clear,
        "show" | "s" => PeerCommand::Show,
        "share" => PeerCommand::Share,
        "leave" => PeerCommand::Leave,
        "help" | "?" => PeerCommand::Help,
        "quit" | "exit" | "q" => PeerCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn parse_point(word: &str) -> Result<Point, ParseError> {
    let invalid = || ParseError::InvalidPoint(word.to_string());
    let (x, y) = word.split_once(',').ok_or_else(invalid)?;
    let x: f64 = x.trim().parse().map_err(|_| invalid())?;
    let y: f64 = y.trim().parse().map_err(|_| invalid())?;
    if !x.is_finite() || !y.is_finite() {
        return Err(invalid());
    }
    Ok(Point::new(x, y))
}
