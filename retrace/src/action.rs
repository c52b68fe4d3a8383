//! Replayable actions and their one-line text encoding.
//!
//! Every action is written as a single line:
//!
//! ```text
//! moveTo(120, 340)
//! mouseDown(120, 340, 'left')
//! mouseUp(120, 340, 'left')
//! scroll(-3)
//! keyDown('a')
//! keyUp('shiftleft')
//! press('enter')
//! sleep(1.5)
//! # free text
//! ```
//!
//! Key names are single-quoted; `\` and `'` inside them are backslash escaped
//! and control characters are written as `\u{hex}`.
//! Sleep durations are seconds with at most millisecond precision.

use crate::error::{Result, RetraceError};
use crate::keys::CanonicalKey;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// A mouse button that can be replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
    Middle,
}

impl Button {
    pub fn as_str(&self) -> &'static str {
        match self {
            Button::Left => "left",
            Button::Right => "right",
            Button::Middle => "middle",
        }
    }
}

impl FromStr for Button {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "left" => Ok(Button::Left),
            "right" => Ok(Button::Right),
            "middle" => Ok(Button::Middle),
            other => Err(format!("unknown mouse button '{}'", other)),
        }
    }
}

/// One line of a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Move { x: i32, y: i32 },
    ButtonDown { x: i32, y: i32, button: Button },
    ButtonUp { x: i32, y: i32, button: Button },
    /// Vertical wheel delta
    Scroll { dy: i64 },
    KeyDown(CanonicalKey),
    KeyUp(CanonicalKey),
    /// A key-down immediately followed by its key-up
    Press(CanonicalKey),
    Sleep(Duration),
    Comment(String),
}

impl Action {
    /// A comment action; line breaks are folded so it stays on one line
    pub fn comment(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Action::Comment(text.replace(['\r', '\n'], " "))
    }

    /// Comments are no-ops on replay
    pub fn is_comment(&self) -> bool {
        matches!(self, Action::Comment(_))
    }

    /// The function-style name used in the text encoding
    pub fn name(&self) -> &'static str {
        match self {
            Action::Move { .. } => "moveTo",
            Action::ButtonDown { .. } => "mouseDown",
            Action::ButtonUp { .. } => "mouseUp",
            Action::Scroll { .. } => "scroll",
            Action::KeyDown(_) => "keyDown",
            Action::KeyUp(_) => "keyUp",
            Action::Press(_) => "press",
            Action::Sleep(_) => "sleep",
            Action::Comment(_) => "#",
        }
    }
}

fn quote(key: &CanonicalKey) -> String {
    let mut out = String::with_capacity(key.as_str().len() + 2);
    out.push('\'');
    for c in key.as_str().chars() {
        if c.is_control() {
            out.push_str(&format!("\\u{{{:x}}}", u32::from(c)));
            continue;
        }
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

fn format_seconds(duration: Duration) -> String {
    let millis = duration.as_millis();
    let (secs, frac) = (millis / 1000, millis % 1000);
    if frac == 0 {
        return secs.to_string();
    }
    let frac = format!("{:03}", frac);
    format!("{}.{}", secs, frac.trim_end_matches('0'))
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move { x, y } => write!(f, "moveTo({}, {})", x, y),
            Action::ButtonDown { x, y, button } | Action::ButtonUp { x, y, button } => {
                write!(f, "{}({}, {}, '{}')", self.name(), x, y, button.as_str())
            }
            Action::Scroll { dy } => write!(f, "scroll({})", dy),
            Action::KeyDown(key) | Action::KeyUp(key) | Action::Press(key) => {
                write!(f, "{}({})", self.name(), quote(key))
            }
            Action::Sleep(duration) => write!(f, "sleep({})", format_seconds(*duration)),
            Action::Comment(text) if text.is_empty() => f.write_str("#"),
            Action::Comment(text) => write!(f, "# {}", text),
        }
    }
}

fn call_regex() -> &'static Regex {
    static CALL: OnceLock<Regex> = OnceLock::new();
    CALL.get_or_init(|| {
        Regex::new(r"^([A-Za-z]+)\s*\((.*)\)$").expect("action call pattern is valid")
    })
}

/// An argument of an action call
#[derive(Debug, PartialEq)]
enum Arg {
    Bare(String),
    Quoted(String),
}

fn split_args(raw: &str) -> std::result::Result<Vec<Arg>, String> {
    let mut args = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.peek() {
            None => break,
            Some('\'') => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some('u') if chars.next_if_eq(&'{').is_some() => {
                                let mut hex = String::new();
                                while let Some(c) = chars.next_if(|c| *c != '}') {
                                    hex.push(c);
                                }
                                if chars.next().is_none() {
                                    return Err("unterminated \\u escape".to_string());
                                }
                                let c = u32::from_str_radix(&hex, 16)
                                    .ok()
                                    .and_then(char::from_u32)
                                    .ok_or_else(|| format!("invalid \\u escape '{}'", hex))?;
                                value.push(c);
                            }
                            Some(c) => value.push(c),
                            None => return Err("dangling escape".to_string()),
                        },
                        Some('\'') => break,
                        Some(c) => value.push(c),
                        None => return Err("unterminated quote".to_string()),
                    }
                }
                args.push(Arg::Quoted(value));
            }
            Some(_) => {
                let mut value = String::new();
                while let Some(c) = chars.next_if(|c| *c != ',') {
                    value.push(c);
                }
                args.push(Arg::Bare(value.trim_end().to_string()));
            }
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(c) => return Err(format!("unexpected '{}' after argument", c)),
        }
    }

    Ok(args)
}

fn int_arg<T: FromStr>(arg: &Arg) -> std::result::Result<T, String> {
    match arg {
        Arg::Bare(value) => value
            .parse()
            .map_err(|_| format!("'{}' is not an integer", value)),
        Arg::Quoted(value) => Err(format!("expected an integer, found '{}'", value)),
    }
}

fn key_arg(arg: &Arg) -> std::result::Result<CanonicalKey, String> {
    match arg {
        Arg::Quoted(value) if !value.is_empty() => Ok(CanonicalKey::new(value.clone())),
        Arg::Quoted(_) => Err("empty key name".to_string()),
        Arg::Bare(value) => Err(format!("key name '{}' must be quoted", value)),
    }
}

fn button_arg(arg: &Arg) -> std::result::Result<Button, String> {
    match arg {
        Arg::Quoted(value) => value.parse(),
        Arg::Bare(value) => Err(format!("button '{}' must be quoted", value)),
    }
}

fn seconds_arg(arg: &Arg) -> std::result::Result<Duration, String> {
    let Arg::Bare(value) = arg else {
        return Err("sleep duration must not be quoted".to_string());
    };
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("sleep duration {} must be a non-negative number", value));
    }
    Ok(Duration::from_millis((secs * 1000.0).round() as u64))
}

fn parse_call(name: &str, args: &[Arg]) -> std::result::Result<Action, String> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(format!("{} takes {} argument(s), found {}", name, n, args.len()))
        }
    };

    match name {
        "moveTo" => {
            arity(2)?;
            Ok(Action::Move {
                x: int_arg(&args[0])?,
                y: int_arg(&args[1])?,
            })
        }
        "mouseDown" | "mouseUp" => {
            arity(3)?;
            let (x, y, button) = (int_arg(&args[0])?, int_arg(&args[1])?, button_arg(&args[2])?);
            Ok(if name == "mouseDown" {
                Action::ButtonDown { x, y, button }
            } else {
                Action::ButtonUp { x, y, button }
            })
        }
        "scroll" => {
            arity(1)?;
            Ok(Action::Scroll {
                dy: int_arg(&args[0])?,
            })
        }
        "keyDown" => {
            arity(1)?;
            Ok(Action::KeyDown(key_arg(&args[0])?))
        }
        "keyUp" => {
            arity(1)?;
            Ok(Action::KeyUp(key_arg(&args[0])?))
        }
        "press" => {
            arity(1)?;
            Ok(Action::Press(key_arg(&args[0])?))
        }
        "sleep" => {
            arity(1)?;
            Ok(Action::Sleep(seconds_arg(&args[0])?))
        }
        other => Err(format!("unknown action '{}'", other)),
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        if let Some(text) = line.strip_prefix('#') {
            let text = text.strip_prefix(' ').unwrap_or(text);
            return Ok(Action::Comment(text.to_string()));
        }

        let captures = call_regex()
            .captures(line)
            .ok_or_else(|| "not an action call".to_string())?;
        let args = split_args(&captures[2])?;
        parse_call(&captures[1], &args)
    }
}

/// Decode a whole capture, skipping blank lines
pub fn parse_capture(text: &str) -> Result<Vec<Action>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            line.parse::<Action>()
                .map_err(|reason| RetraceError::MalformedCapture {
                    line: index + 1,
                    content: line.to_string(),
                    reason,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CanonicalKey {
        CanonicalKey::new(name)
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Move { x: 120, y: 340 }.to_string(), "moveTo(120, 340)");
        assert_eq!(
            Action::ButtonDown { x: 10, y: 10, button: Button::Left }.to_string(),
            "mouseDown(10, 10, 'left')"
        );
        assert_eq!(
            Action::ButtonUp { x: 5, y: 6, button: Button::Middle }.to_string(),
            "mouseUp(5, 6, 'middle')"
        );
        assert_eq!(Action::Scroll { dy: -3 }.to_string(), "scroll(-3)");
        assert_eq!(Action::KeyDown(key("a")).to_string(), "keyDown('a')");
        assert_eq!(Action::Press(key("enter")).to_string(), "press('enter')");
        assert_eq!(Action::Sleep(Duration::from_secs(2)).to_string(), "sleep(2)");
        assert_eq!(Action::Sleep(Duration::from_millis(1500)).to_string(), "sleep(1.5)");
        assert_eq!(Action::Sleep(Duration::from_millis(250)).to_string(), "sleep(0.25)");
        assert_eq!(Action::comment("hello").to_string(), "# hello");
        assert_eq!(Action::comment("").to_string(), "#");
    }

    #[test]
    fn test_key_quoting() {
        assert_eq!(Action::KeyDown(key("'")).to_string(), r"keyDown('\'')");
        assert_eq!(Action::KeyUp(key("\\")).to_string(), r"keyUp('\\')");
        assert_eq!("keyDown('\\'')".parse::<Action>(), Ok(Action::KeyDown(key("'"))));
        assert_eq!(r"keyUp('\\')".parse::<Action>(), Ok(Action::KeyUp(key("\\"))));
        assert_eq!("press(',')".parse::<Action>(), Ok(Action::Press(key(","))));
    }

    #[test]
    fn test_control_characters_stay_on_one_line() {
        let newline = Action::KeyDown(key("\n"));
        assert_eq!(newline.to_string(), r"keyDown('\u{a}')");

        for action in [newline, Action::Press(key("a\tb\u{7}")), Action::KeyUp(key("u"))] {
            let line = action.to_string();
            assert!(!line.chars().any(char::is_control));
            assert_eq!(line.parse::<Action>(), Ok(action));
        }

        assert_eq!(r"press('\u')".parse::<Action>(), Ok(Action::Press(key("u"))));
        assert!(r"press('\u{zz}')".parse::<Action>().is_err());
        assert!(r"press('\u{a')".parse::<Action>().is_err());
    }

    #[test]
    fn test_parse_tolerates_spacing() {
        assert_eq!(
            "  mouseDown(10,10,'left')  ".parse::<Action>(),
            Ok(Action::ButtonDown { x: 10, y: 10, button: Button::Left })
        );
        assert_eq!(
            "sleep( 0.1 )".parse::<Action>(),
            Ok(Action::Sleep(Duration::from_millis(100)))
        );
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!("moveTo(1)".parse::<Action>().is_err());
        assert!("moveTo(a, b)".parse::<Action>().is_err());
        assert!("mouseDown(1, 2, 'thumb')".parse::<Action>().is_err());
        assert!("keyDown(a)".parse::<Action>().is_err());
        assert!("keyDown('')".parse::<Action>().is_err());
        assert!("keyDown('a".parse::<Action>().is_err());
        assert!("sleep(-1)".parse::<Action>().is_err());
        assert!("sleep('1')".parse::<Action>().is_err());
        assert!("launchMissiles()".parse::<Action>().is_err());
        assert!("import os".parse::<Action>().is_err());
    }

    #[test]
    fn test_comment_round_trip() {
        for text in ["", "plain", " leading space", "unsupported key: Unknown(12)"] {
            let action = Action::comment(text);
            assert_eq!(action.to_string().parse::<Action>(), Ok(action));
        }
        assert_eq!(Action::comment("two\nlines"), Action::Comment("two lines".to_string()));
    }

    #[test]
    fn test_parse_capture_reports_line_numbers() {
        let text = "# header\n\nmoveTo(1, 2)\nbogus\n";
        match parse_capture(text) {
            Err(RetraceError::MalformedCapture { line, content, .. }) => {
                assert_eq!(line, 4);
                assert_eq!(content, "bogus");
            }
            other => panic!("expected malformed capture, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_capture_round_trip() {
        let actions = vec![
            Action::comment("Created by retrace"),
            Action::Move { x: -20, y: 1080 },
            Action::ButtonDown { x: 10, y: 10, button: Button::Right },
            Action::Sleep(Duration::from_millis(2300)),
            Action::ButtonUp { x: 10, y: 10, button: Button::Right },
            Action::Scroll { dy: 2 },
            Action::Press(key("a")),
            Action::KeyDown(key("ctrlleft")),
            Action::KeyDown(key("'")),
            Action::KeyUp(key("ctrlleft")),
        ];
        let text = actions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        assert_eq!(parse_capture(&text).unwrap(), actions);
    }
}
