use super::join_lines;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Section(String),
    Setting {
        section: Option<String>,
        key: String,
        value: String,
    },
    Other(String),
}

/// systemd-style `[Section]` / `Key=Value` file (unit drop-ins, journald.conf).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFile {
    lines: Vec<Line>,
}

impl UnitFile {
    pub fn parse(text: &str) -> Self {
        let mut current: Option<String> = None;
        let mut lines = Vec::new();
        for raw in text.lines() {
            let trimmed = raw.trim();
            if let Some(name) = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            {
                current = Some(name.trim().to_string());
                lines.push(Line::Section(name.trim().to_string()));
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                lines.push(Line::Other(raw.to_string()));
                continue;
            }
            match trimmed.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => lines.push(Line::Setting {
                    section: current.clone(),
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                }),
                _ => lines.push(Line::Other(raw.to_string())),
            }
        }
        Self { lines }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Setting {
                section: Some(s),
                key: k,
                value,
            } if s == section && k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Updates the effective setting, or inserts it at the end of the
    /// section (creating the section when needed).
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        if let Some(Line::Setting { value: current, .. }) =
            self.lines.iter_mut().rev().find(|line| match line {
                Line::Setting {
                    section: Some(s),
                    key: k,
                    ..
                } => s == section && k == key,
                _ => false,
            })
        {
            *current = value.to_string();
            return;
        }

        let setting = Line::Setting {
            section: Some(section.to_string()),
            key: key.to_string(),
            value: value.to_string(),
        };

        let Some(start) = self
            .lines
            .iter()
            .position(|line| matches!(line, Line::Section(name) if name == section))
        else {
            if !self.lines.is_empty() {
                self.lines.push(Line::Other(String::new()));
            }
            self.lines.push(Line::Section(section.to_string()));
            self.lines.push(setting);
            return;
        };

        // Blank lines separating sections stay after the new setting.
        let mut insert_at = start + 1;
        for (offset, line) in self.lines[start + 1..].iter().enumerate() {
            match line {
                Line::Section(_) => break,
                Line::Other(raw) if raw.trim().is_empty() => {}
                _ => insert_at = start + offset + 2,
            }
        }
        self.lines.insert(insert_at, setting);
    }

    pub fn render(&self) -> String {
        let lines = self
            .lines
            .iter()
            .map(|line| match line {
                Line::Section(name) => format!("[{name}]"),
                Line::Setting { key, value, .. } => format!("{key}={value}"),
                Line::Other(raw) => raw.clone(),
            })
            .collect::<Vec<_>>();
        join_lines(&lines)
    }
}

#[cfg(test)]
mod tests {
    use super::UnitFile;

    const JOURNALD: &str = "# journald\n[Journal]\n#Storage=auto\nStorage=persistent\n\n[Other]\nKey=1\n";

    #[test]
    fn reads_settings_by_section() {
        let file = UnitFile::parse(JOURNALD);
        assert_eq!(file.get("Journal", "Storage"), Some("persistent"));
        assert_eq!(file.get("Other", "Storage"), None);
        assert_eq!(file.get("Other", "Key"), Some("1"));
    }

    #[test]
    fn inserts_into_existing_section() {
        let mut file = UnitFile::parse(JOURNALD);
        file.set("Journal", "SystemMaxUse", "100M");
        assert_eq!(
            file.render(),
            "# journald\n[Journal]\n#Storage=auto\nStorage=persistent\nSystemMaxUse=100M\n\n[Other]\nKey=1\n"
        );
    }

    #[test]
    fn creates_missing_section() {
        let mut file = UnitFile::parse("");
        file.set("Service", "Restart", "always");
        assert_eq!(file.render(), "[Service]\nRestart=always\n");
        file.set("Service", "Restart", "on-failure");
        assert_eq!(file.get("Service", "Restart"), Some("on-failure"));
    }
}
