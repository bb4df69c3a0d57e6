use layout_player::regions::mapper::PointerEvent;
use std::str::FromStr;

/// A line typed on the viewer's standard input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Select(String),
    Click(PointerEvent),
    Abr(bool),
    Load(String),
    Status,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("empty command".into());
        };
        let rest: Vec<&str> = words.collect();

        match (verb, rest.as_slice()) {
            ("select" | "s", [name]) => Ok(Command::Select(name.to_string())),
            ("click" | "c", [x, y, width, height]) => Ok(Command::Click(PointerEvent {
                x: number(x)?,
                y: number(y)?,
                surface_width: number(width)?,
                surface_height: number(height)?,
            })),
            ("abr", ["on"]) => Ok(Command::Abr(true)),
            ("abr", ["off"]) => Ok(Command::Abr(false)),
            ("load", [url]) => Ok(Command::Load(url.to_string())),
            ("status", []) => Ok(Command::Status),
            ("quit" | "q" | "exit", []) => Ok(Command::Quit),
            _ => Err(format!(
                "unknown command '{}', try: select <layout> | click <x> <y> <w> <h> | abr on|off | load <url> | status | quit",
                line.trim()
            )),
        }
    }
}

fn number(value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", value))
}
