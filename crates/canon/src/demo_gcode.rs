//! A minimal line-splitter for the `canon` CLI's `run`/`batch` demos.
//!
//! The G-code tokenizer is an excluded collaborator (§1 Non-goals): the
//! canonical machine's real entry points (`Dispatcher`) take typed
//! arguments, never text. This module exists only so the CLI has *some*
//! text format to feed those entry points with when run from a file or a
//! terminal; it is deliberately not part of the `canon` library crate and
//! is not meant to be a complete G-code parser — unsupported words are
//! silently ignored rather than raising a `canon::errors::InputError`.

use canon::{CanonError, Dispatcher};
use motion::gcode_state::{FeedRateMode, SpindleMode};
use motion::kinematics::AXES;

#[derive(Debug, Clone, PartialEq)]
pub enum DemoCommand {
    Traverse([Option<f32>; AXES]),  // G0
    Feed([Option<f32>; AXES]),      // G1
    Dwell(f32),                     // G4 Pn (seconds)
    SelectCoordSystem(u8),          // G54-G59
    SetFeedRate(f32),
    SpindleOn(f32),                 // M3
    SpindleOff,                     // M5
    FloodCoolantOn,                 // M8
    CoolantOff,                     // M9
    ProgramEnd,                     // M2/M30
    Unrecognized,
}

fn axis_index(letter: char) -> Option<usize> {
    match letter.to_ascii_uppercase() {
        'X' => Some(0),
        'Y' => Some(1),
        'Z' => Some(2),
        'A' => Some(3),
        'B' => Some(4),
        'C' => Some(5),
        _ => None,
    }
}

/// Splits one line of demo input into a word list, stripping comments
/// (`;` to end of line, and `(...)` inline comments) the way a real G-code
/// tokenizer would, but without any of its semantic validation.
fn words(line: &str) -> Vec<(char, f32)> {
    let code = match line.split(';').next().unwrap_or("") {
        s => s,
    };
    let mut out = Vec::new();
    let mut in_paren = false;
    let mut buf = String::new();
    for ch in code.chars() {
        if ch == '(' {
            in_paren = true;
            continue;
        }
        if ch == ')' {
            in_paren = false;
            continue;
        }
        if in_paren {
            continue;
        }
        if ch.is_whitespace() {
            continue;
        }
        buf.push(ch);
    }
    let mut chars = buf.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_alphabetic() {
            let mut num = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_digit() || next == '.' || next == '-' {
                    num.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if let Ok(value) = num.parse::<f32>() {
                out.push((c.to_ascii_uppercase(), value));
            }
        }
    }
    out
}

/// Parses one line of demo G-code into zero or more [`DemoCommand`]s, in
/// the order they should be applied (an `F` word on a motion line sets the
/// feed rate before the move it modifies). Lines with no recognized
/// command word (blank lines, bare comments) yield no commands.
pub fn parse_line(line: &str) -> Vec<DemoCommand> {
    let tokens = words(line);
    let mut target = [None; AXES];
    let mut command_word: Option<(char, f32)> = None;
    let mut feed_rate = None;
    let mut dwell_p = None;

    for (letter, value) in &tokens {
        if let Some(axis) = axis_index(*letter) {
            target[axis] = Some(*value);
            continue;
        }
        match letter {
            'F' => feed_rate = Some(*value),
            'P' => dwell_p = Some(*value),
            'G' | 'M' => command_word = Some((*letter, *value)),
            _ => {} // 'S' (spindle speed) read separately below
        }
    }

    let spindle_speed = tokens
        .iter()
        .find(|(l, _)| *l == 'S')
        .map(|(_, v)| *v)
        .unwrap_or(0.0);

    let mut out = Vec::new();
    if let Some(f) = feed_rate {
        out.push(DemoCommand::SetFeedRate(f));
    }

    match command_word {
        Some(('G', g)) if g == 0.0 => out.push(DemoCommand::Traverse(target)),
        Some(('G', g)) if g == 1.0 => out.push(DemoCommand::Feed(target)),
        Some(('G', g)) if g == 4.0 => out.push(DemoCommand::Dwell(dwell_p.unwrap_or(0.0))),
        Some(('G', g)) if (54.0..=59.0).contains(&g) => {
            out.push(DemoCommand::SelectCoordSystem((g - 54.0).round() as u8))
        }
        Some(('M', m)) if m == 3.0 => out.push(DemoCommand::SpindleOn(spindle_speed)),
        Some(('M', m)) if m == 5.0 => out.push(DemoCommand::SpindleOff),
        Some(('M', m)) if m == 8.0 => out.push(DemoCommand::FloodCoolantOn),
        Some(('M', m)) if m == 9.0 => out.push(DemoCommand::CoolantOff),
        Some(('M', m)) if m == 2.0 || m == 30.0 => out.push(DemoCommand::ProgramEnd),
        _ => {}
    }

    if out.is_empty() {
        out.push(DemoCommand::Unrecognized);
    }
    out
}

/// Applies one [`DemoCommand`] against a [`Dispatcher`], mapping it onto the
/// canonical machine's typed entry points. `Unrecognized` is silently
/// accepted (a real tokenizer would reject it, but that's the excluded
/// collaborator's job, not this demo splitter's).
pub fn apply_demo_command(d: &mut Dispatcher<'_>, command: DemoCommand) -> Result<(), CanonError> {
    match command {
        DemoCommand::Traverse(target) => d.straight_traverse(target),
        DemoCommand::Feed(target) => d.straight_feed(target),
        DemoCommand::Dwell(seconds) => d.dwell(seconds),
        DemoCommand::SelectCoordSystem(index) => d.select_coord_system(index),
        DemoCommand::SetFeedRate(feed) => {
            d.set_feed_rate(feed, FeedRateMode::UnitsPerMinute);
            Ok(())
        }
        DemoCommand::SpindleOn(speed) => d.set_spindle(SpindleMode::Clockwise, speed),
        DemoCommand::SpindleOff => d.set_spindle(SpindleMode::Off, 0.0),
        DemoCommand::FloodCoolantOn => d.set_flood_coolant(true),
        DemoCommand::CoolantOff => {
            d.set_flood_coolant(false)?;
            d.set_mist_coolant(false)
        }
        DemoCommand::ProgramEnd => d.program_end(),
        DemoCommand::Unrecognized => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_g1_move_with_feed() {
        let cmds = parse_line("G1 X10 Y20 F300");
        assert_eq!(cmds[0], DemoCommand::SetFeedRate(300.0));
        match &cmds[1] {
            DemoCommand::Feed(target) => {
                assert_eq!(target[0], Some(10.0));
                assert_eq!(target[1], Some(20.0));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn strips_comments() {
        assert_eq!(parse_line("; just a comment"), vec![DemoCommand::Unrecognized]);
        match &parse_line("G0 X5 (rapid to home) ")[0] {
            DemoCommand::Traverse(target) => assert_eq!(target[0], Some(5.0)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_program_end() {
        assert_eq!(parse_line("M30"), vec![DemoCommand::ProgramEnd]);
    }
}
