//! Signal script format
//!
//! One directive per line, `#` starts a comment:
//!
//! ```text
//! initial screen=on keyguard=locked call=idle proximity=far
//! proximity near
//! wait 1000
//! screen off
//! ```
//!
//! The same line syntax is read from stdin by `pocket run`.

use anyhow::{Context, Result};
use pocket_core::{Keyguard, ParseValueError, PhoneCall, Proximity, Screen, Signal, Snapshot};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("line {line}: unknown directive {directive:?}")]
    UnknownDirective { line: usize, directive: String },

    #[error("line {line}: {directive} expects exactly one argument")]
    BadArity { line: usize, directive: &'static str },

    #[error("line {line}: {source}")]
    InvalidValue {
        line: usize,
        #[source]
        source: ParseValueError,
    },

    #[error("line {line}: invalid wait duration {value:?} (expected milliseconds)")]
    InvalidWait { line: usize, value: String },

    #[error("line {line}: unknown initial key {key:?}")]
    UnknownInitialKey { line: usize, key: String },

    #[error("line {line}: initial must come before any other directive")]
    MisplacedInitial { line: usize },
}

impl ScriptError {
    pub fn line(&self) -> usize {
        match self {
            ScriptError::UnknownDirective { line, .. }
            | ScriptError::BadArity { line, .. }
            | ScriptError::InvalidValue { line, .. }
            | ScriptError::InvalidWait { line, .. }
            | ScriptError::UnknownInitialKey { line, .. }
            | ScriptError::MisplacedInitial { line } => *line,
        }
    }
}

/// One parsed line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Initial(Snapshot),
    Signal(Signal),
    Wait(Duration),
}

/// What follows the initial snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Signal(Signal),
    Wait(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub initial: Snapshot,
    pub steps: Vec<Step>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut initial = None;
        let mut steps = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            match parse_line(raw, line)? {
                None => {}
                Some(Directive::Initial(snapshot)) => {
                    if initial.is_some() || !steps.is_empty() {
                        return Err(ScriptError::MisplacedInitial { line });
                    }
                    initial = Some(snapshot);
                }
                Some(Directive::Signal(signal)) => steps.push(Step::Signal(signal)),
                Some(Directive::Wait(duration)) => steps.push(Step::Wait(duration)),
            }
        }

        Ok(Self {
            initial: initial.unwrap_or_default(),
            steps,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid script: {}", path.display()))
    }

    /// Total virtual time the script spans
    pub fn duration(&self) -> Duration {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Wait(d) => *d,
                Step::Signal(_) => Duration::ZERO,
            })
            .sum()
    }
}

/// Parse a single line. Blank lines and comments yield `None`.
pub fn parse_line(raw: &str, line: usize) -> Result<Option<Directive>, ScriptError> {
    let text = match raw.split_once('#') {
        Some((before, _)) => before,
        None => raw,
    };
    let mut words = text.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let invalid = |source: ParseValueError| ScriptError::InvalidValue { line, source };

    let directive = match head.to_ascii_lowercase().as_str() {
        "initial" => Directive::Initial(parse_initial(&args, line)?),
        "wait" => {
            let value = single_arg("wait", &args, line)?;
            let ms: u64 = value.parse().map_err(|_| ScriptError::InvalidWait {
                line,
                value: value.to_string(),
            })?;
            Directive::Wait(Duration::from_millis(ms))
        }
        "screen" => Directive::Signal(Signal::Screen(
            single_arg("screen", &args, line)?
                .parse::<Screen>()
                .map_err(invalid)?,
        )),
        "keyguard" => Directive::Signal(Signal::Keyguard(
            single_arg("keyguard", &args, line)?
                .parse::<Keyguard>()
                .map_err(invalid)?,
        )),
        "call" => Directive::Signal(Signal::PhoneCall(
            single_arg("call", &args, line)?
                .parse::<PhoneCall>()
                .map_err(invalid)?,
        )),
        "proximity" => Directive::Signal(Signal::Proximity(
            single_arg("proximity", &args, line)?
                .parse::<Proximity>()
                .map_err(invalid)?,
        )),
        _ => {
            return Err(ScriptError::UnknownDirective {
                line,
                directive: head.to_string(),
            });
        }
    };

    Ok(Some(directive))
}

fn single_arg<'a>(
    directive: &'static str,
    args: &[&'a str],
    line: usize,
) -> Result<&'a str, ScriptError> {
    match args {
        [value] => Ok(*value),
        _ => Err(ScriptError::BadArity { line, directive }),
    }
}

fn parse_initial(args: &[&str], line: usize) -> Result<Snapshot, ScriptError> {
    let mut snapshot = Snapshot::default();
    let invalid = |source: ParseValueError| ScriptError::InvalidValue { line, source };

    for arg in args {
        let (key, value) = arg.split_once('=').ok_or_else(|| ScriptError::UnknownInitialKey {
            line,
            key: arg.to_string(),
        })?;
        match key.to_ascii_lowercase().as_str() {
            "screen" => snapshot.screen = value.parse::<Screen>().map_err(invalid)?,
            "keyguard" => snapshot.keyguard = value.parse::<Keyguard>().map_err(invalid)?,
            "call" => snapshot.phone_call = value.parse::<PhoneCall>().map_err(invalid)?,
            "proximity" => snapshot.proximity = value.parse::<Proximity>().map_err(invalid)?,
            _ => {
                return Err(ScriptError::UnknownInitialKey {
                    line,
                    key: key.to_string(),
                });
            }
        }
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_script() {
        let script = Script::parse(
            "# pocket\n\
             initial screen=on keyguard=unlocked\n\
             \n\
             proximity near   # covered\n\
             wait 250\n\
             call ongoing\n",
        )
        .unwrap();

        assert_eq!(
            script.initial,
            Snapshot {
                screen: Screen::On,
                keyguard: Keyguard::Unlocked,
                phone_call: PhoneCall::Idle,
                proximity: Proximity::Far,
            }
        );
        assert_eq!(
            script.steps,
            vec![
                Step::Signal(Signal::Proximity(Proximity::Near)),
                Step::Wait(Duration::from_millis(250)),
                Step::Signal(Signal::PhoneCall(PhoneCall::Ongoing)),
            ]
        );
        assert_eq!(script.duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_initial_uses_defaults() {
        let script = Script::parse("screen on\n").unwrap();
        assert_eq!(script.initial, Snapshot::default());
        assert_eq!(script.steps, vec![Step::Signal(Signal::Screen(Screen::On))]);
    }

    #[test]
    fn test_blank_and_comment_lines() {
        assert_eq!(parse_line("", 1), Ok(None));
        assert_eq!(parse_line("   # only a comment", 1), Ok(None));
        assert_eq!(
            parse_line("  SCREEN  On ", 1),
            Ok(Some(Directive::Signal(Signal::Screen(Screen::On))))
        );
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = Script::parse("screen on\nproximity sideways\n").unwrap_err();
        assert_eq!(err.line(), 2);
        assert_eq!(
            err.to_string(),
            "line 2: unknown proximity value: \"sideways\""
        );

        let err = Script::parse("\n\nlock now\n").unwrap_err();
        assert_eq!(
            err,
            ScriptError::UnknownDirective {
                line: 3,
                directive: "lock".to_string()
            }
        );
    }

    #[test]
    fn test_wait_requires_milliseconds() {
        assert_eq!(
            parse_line("wait 1.5s", 4),
            Err(ScriptError::InvalidWait {
                line: 4,
                value: "1.5s".to_string()
            })
        );
        assert_eq!(
            parse_line("wait", 5),
            Err(ScriptError::BadArity {
                line: 5,
                directive: "wait"
            })
        );
        assert_eq!(
            parse_line("keyguard locked unlocked", 6),
            Err(ScriptError::BadArity {
                line: 6,
                directive: "keyguard"
            })
        );
    }

    #[test]
    fn test_initial_must_lead() {
        let err = Script::parse("screen on\ninitial proximity=near\n").unwrap_err();
        assert_eq!(err, ScriptError::MisplacedInitial { line: 2 });

        let err = Script::parse("initial\ninitial screen=on\n").unwrap_err();
        assert_eq!(err, ScriptError::MisplacedInitial { line: 2 });
    }

    #[test]
    fn test_initial_rejects_unknown_keys() {
        assert_eq!(
            parse_line("initial lid=closed", 1),
            Err(ScriptError::UnknownInitialKey {
                line: 1,
                key: "lid".to_string()
            })
        );
        assert_eq!(
            parse_line("initial screen", 1),
            Err(ScriptError::UnknownInitialKey {
                line: 1,
                key: "screen".to_string()
            })
        );
    }

    #[test]
    fn test_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pocket.script");
        std::fs::write(&path, "initial screen=on\nproximity near\nwait 1000\n").unwrap();

        let script = Script::from_file(&path).unwrap();
        assert_eq!(script.initial.screen, Screen::On);
        assert_eq!(script.steps.len(), 2);

        let missing = Script::from_file(&tmp.path().join("absent.script"));
        assert!(missing.is_err());
    }
}
