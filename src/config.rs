// wash.cfg parser: line-oriented `key<whitespace>value` pairs, `;` comments
// to end of line, 1-255 byte keys/values, duplicate keys overwrite. A
// small state machine recovers at the next newline after any malformed
// line rather than aborting the whole file.

use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    PreKey,
    Key,
    PreVal,
    Val,
    PostVal,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    KeyTooLong,
    ValueTooLong,
    MalformedLine(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::KeyTooLong => write!(f, "config key longer than 255 bytes"),
            ConfigError::ValueTooLong => write!(f, "config value longer than 255 bytes"),
            ConfigError::MalformedLine(n) => write!(f, "malformed config line {}", n),
        }
    }
}

impl std::error::Error for ConfigError {}

const MAX_LEN: usize = 255;

#[derive(Default)]
pub struct Config {
    entries: HashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Config { entries: HashMap::new() }
    }

    /// Parses `text` line by line. A malformed line is skipped (recovery
    /// resumes at the next `\n`); earlier and later valid lines still take
    /// effect. Returns the first error encountered, if any, but keeps
    /// parsing -- the caller decides whether a parse error is fatal.
    pub fn parse(text: &str) -> (Self, Option<ConfigError>) {
        let mut config = Config::new();
        let mut first_err = None;

        for (lineno, raw_line) in text.lines().enumerate() {
            if let Err(e) = config.parse_line(raw_line) {
                if first_err.is_none() {
                    first_err = Some(match e {
                        ConfigError::MalformedLine(_) => ConfigError::MalformedLine(lineno + 1),
                        other => other,
                    });
                }
            }
        }
        (config, first_err)
    }

    fn parse_line(&mut self, line: &str) -> Result<(), ConfigError> {
        let mut state = State::PreKey;
        let mut key = String::new();
        let mut val = String::new();

        for ch in line.chars() {
            if ch == ';' && state != State::Error {
                break;
            }
            state = match state {
                State::PreKey => {
                    if ch.is_whitespace() {
                        State::PreKey
                    } else {
                        key.push(ch);
                        State::Key
                    }
                }
                State::Key => {
                    if ch.is_whitespace() {
                        State::PreVal
                    } else if key.len() >= MAX_LEN {
                        return Err(ConfigError::KeyTooLong);
                    } else {
                        key.push(ch);
                        State::Key
                    }
                }
                State::PreVal => {
                    if ch.is_whitespace() {
                        State::PreVal
                    } else {
                        val.push(ch);
                        State::Val
                    }
                }
                State::Val => {
                    if ch.is_whitespace() {
                        State::PostVal
                    } else if val.len() >= MAX_LEN {
                        return Err(ConfigError::ValueTooLong);
                    } else {
                        val.push(ch);
                        State::Val
                    }
                }
                State::PostVal => {
                    if ch.is_whitespace() {
                        State::PostVal
                    } else {
                        return Err(ConfigError::MalformedLine(0));
                    }
                }
                State::Error => State::Error,
            };
        }

        match state {
            State::PreKey | State::PostVal => Ok(()),
            State::Val if !key.is_empty() && !val.is_empty() => {
                self.entries.insert(key, val);
                Ok(())
            }
            _ => {
                if key.is_empty() && val.is_empty() {
                    Ok(())
                } else {
                    Err(ConfigError::MalformedLine(0))
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    /// Typed boolean accessor: `true`/`1` and `false`/`0` only. An invalid
    /// value is an error and does not mutate anything -- there is nothing
    /// to mutate, since this reads from the already-parsed map.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.entries.get(key).map(|s| s.as_str()) {
            None => Ok(None),
            Some("true") | Some("1") => Ok(Some(true)),
            Some("false") | Some("0") => Ok(Some(false)),
            Some(_) => Err(ConfigError::MalformedLine(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_pairs_and_skips_comments() {
        let (cfg, err) = Config::parse("win.fullscreen true\n; a comment\nwin.width 640\n");
        assert!(err.is_none());
        assert_eq!(cfg.get("win.fullscreen"), Some("true"));
        assert_eq!(cfg.get("win.width"), Some("640"));
    }

    #[test]
    fn duplicate_keys_overwrite() {
        let (cfg, _) = Config::parse("k a\nk b\n");
        assert_eq!(cfg.get("k"), Some("b"));
    }

    #[test]
    fn malformed_line_does_not_prevent_later_lines_from_parsing() {
        let (cfg, err) = Config::parse("k1 v1 trailing-garbage\nk2 v2\n");
        assert!(err.is_some());
        assert_eq!(cfg.get("k2"), Some("v2"));
    }

    #[test]
    fn bool_accessor_accepts_true_1_false_0() {
        let (cfg, _) = Config::parse("a true\nb 0\nc garbage\n");
        assert_eq!(cfg.get_bool("a"), Ok(Some(true)));
        assert_eq!(cfg.get_bool("b"), Ok(Some(false)));
        assert!(cfg.get_bool("c").is_err());
        assert_eq!(cfg.get_bool("missing"), Ok(None));
    }
}
