use super::join_lines;
use super::kv::parse_assignment;

/// Keys the firmware accumulates rather than overriding.
const REPEATABLE_KEYS: [&str; 3] = ["dtoverlay", "dtparam", "include"];

pub fn is_repeatable(key: &str) -> bool {
    REPEATABLE_KEYS.contains(&key)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Filter {
        name: String,
        raw: String,
    },
    Assignment {
        key: String,
        value: String,
        /// Outside any board filter, or after `[all]`.
        unconditional: bool,
        raw: Option<String>,
    },
    Other(String),
}

/// Raspberry Pi firmware `config.txt`.
///
/// Conditional filters such as `[pi4]` or `[cm5]` scope the assignments that
/// follow them until the next filter; `[all]` clears them. Reads and writes
/// only look at unconditional assignments, so a board-specific line is never
/// taken for a global one. Unmodified lines render exactly as parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirmwareConfig {
    lines: Vec<Line>,
}

impl FirmwareConfig {
    pub fn parse(text: &str) -> Self {
        let mut unconditional = true;
        let mut lines = Vec::new();
        for raw in text.lines() {
            let trimmed = raw.trim();
            if let Some(name) = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            {
                let name = name.trim();
                unconditional = name.eq_ignore_ascii_case("all");
                lines.push(Line::Filter {
                    name: name.to_string(),
                    raw: raw.to_string(),
                });
                continue;
            }
            lines.push(match parse_assignment(raw) {
                Some((key, value)) => Line::Assignment {
                    key,
                    value,
                    unconditional,
                    raw: Some(raw.to_string()),
                },
                None => Line::Other(raw.to_string()),
            });
        }
        Self { lines }
    }

    /// Every unconditional value of `key`, in file order.
    pub fn values<'a, 'k>(&'a self, key: &'k str) -> impl Iterator<Item = &'a str> + 'k
    where
        'a: 'k,
    {
        self.lines.iter().filter_map(move |line| match line {
            Line::Assignment {
                key: k,
                value,
                unconditional: true,
                ..
            } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// The effective unconditional value of a single-valued key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values(key).last()
    }

    /// Repeatable keys match any of their values; others match the
    /// effective one.
    pub fn contains(&self, key: &str, value: &str) -> bool {
        if is_repeatable(key) {
            self.values(key).any(|existing| existing == value)
        } else {
            self.get(key) == Some(value)
        }
    }

    /// Makes `key=value` apply to every board. Repeatable keys gain an extra
    /// line; single-valued keys are rewritten in place when set globally.
    pub fn set(&mut self, key: &str, value: &str) {
        if self.contains(key, value) {
            return;
        }
        if !is_repeatable(key) {
            let existing = self.lines.iter_mut().rev().find(|line| {
                matches!(line, Line::Assignment { key: k, unconditional: true, .. } if k == key)
            });
            if let Some(Line::Assignment { value: current, raw, .. }) = existing {
                *current = value.to_string();
                *raw = None;
                return;
            }
        }
        self.append_unconditional(key, value);
    }

    fn append_unconditional(&mut self, key: &str, value: &str) {
        let ends_unconditional = self
            .lines
            .iter()
            .rev()
            .find_map(|line| match line {
                Line::Filter { name, .. } => Some(name.eq_ignore_ascii_case("all")),
                _ => None,
            })
            .unwrap_or(true);
        if !ends_unconditional {
            self.lines.push(Line::Filter {
                name: "all".to_string(),
                raw: "[all]".to_string(),
            });
        }
        self.lines.push(Line::Assignment {
            key: key.to_string(),
            value: value.to_string(),
            unconditional: true,
            raw: None,
        });
    }

    pub fn render(&self) -> String {
        let lines = self
            .lines
            .iter()
            .map(|line| match line {
                Line::Filter { raw, .. } => raw.clone(),
                Line::Assignment { raw: Some(raw), .. } => raw.clone(),
                Line::Assignment { key, value, .. } => format!("{key}={value}"),
                Line::Other(raw) => raw.clone(),
            })
            .collect::<Vec<_>>();
        join_lines(&lines)
    }
}
