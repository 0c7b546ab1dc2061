use super::join_lines;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// `raw` is dropped once the value is rewritten.
    Assignment {
        key: String,
        value: String,
        raw: Option<String>,
    },
    Other(String),
}

/// Flat `key=value` text such as sysctl.d fragments. Lines starting with `#`
/// or `;` are comments. When a key is assigned more than once the last
/// assignment wins, matching how sysctl reads these files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValueFile {
    lines: Vec<Line>,
}

impl KeyValueFile {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|raw| match parse_assignment(raw) {
                Some((key, value)) => Line::Assignment {
                    key,
                    value,
                    raw: Some(raw.to_string()),
                },
                None => Line::Other(raw.to_string()),
            })
            .collect();
        Self { lines }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Assignment { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Rewrites the effective assignment in place, or appends one.
    pub fn set(&mut self, key: &str, value: &str) {
        let existing = self
            .lines
            .iter_mut()
            .rev()
            .find(|line| matches!(line, Line::Assignment { key: k, .. } if k == key));
        match existing {
            Some(Line::Assignment { value: current, raw, .. }) => {
                if current.as_str() != value {
                    *current = value.to_string();
                    *raw = None;
                }
            }
            _ => self.lines.push(Line::Assignment {
                key: key.to_string(),
                value: value.to_string(),
                raw: None,
            }),
        }
    }

    pub fn render(&self) -> String {
        let lines = self
            .lines
            .iter()
            .map(|line| match line {
                Line::Assignment { raw: Some(raw), .. } => raw.clone(),
                Line::Assignment { key, value, .. } => format!("{key}={value}"),
                Line::Other(raw) => raw.clone(),
            })
            .collect::<Vec<_>>();
        join_lines(&lines)
    }
}

pub(super) fn parse_assignment(raw: &str) -> Option<(String, String)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::KeyValueFile;

    #[test]
    fn last_assignment_wins() {
        let file = KeyValueFile::parse("vm.swappiness = 60\n# tuned\nvm.swappiness=10\n");
        assert_eq!(file.get("vm.swappiness"), Some("10"));
        assert_eq!(file.get("vm.vfs_cache_pressure"), None);
    }

    #[test]
    fn set_replaces_in_place_and_keeps_comments() {
        let mut file = KeyValueFile::parse("# vm\nvm.swappiness=60\n\nvm.dirty_ratio=20\n");
        file.set("vm.swappiness", "10");
        assert_eq!(file.render(), "# vm\nvm.swappiness=10\n\nvm.dirty_ratio=20\n");
    }

    #[test]
    fn untouched_assignments_keep_their_spacing() {
        let mut file = KeyValueFile::parse("vm.swappiness = 60\nvm.dirty_ratio = 20\n");
        file.set("vm.dirty_ratio", "10");
        file.set("vm.swappiness", "60");
        assert_eq!(file.render(), "vm.swappiness = 60\nvm.dirty_ratio=10\n");
    }

    #[test]
    fn set_appends_missing_key() {
        let mut file = KeyValueFile::parse("");
        file.set("vm.swappiness", "10");
        file.set("vm.vfs_cache_pressure", "50");
        assert_eq!(file.render(), "vm.swappiness=10\nvm.vfs_cache_pressure=50\n");
    }

    #[test]
    fn comment_lines_are_not_assignments() {
        let file = KeyValueFile::parse("; vm.swappiness=1\n#vm.swappiness=30\n");
        assert_eq!(file.get("vm.swappiness"), None);
    }
}
