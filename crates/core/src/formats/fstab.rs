use super::join_lines;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: Vec<String>,
    pub dump: String,
    pub pass: String,
}

impl FstabEntry {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        let fields = trimmed.split_whitespace().collect::<Vec<_>>();
        if fields.len() < 4 {
            return None;
        }
        Some(Self {
            device: fields[0].to_string(),
            mount_point: fields[1].to_string(),
            fs_type: fields[2].to_string(),
            options: fields[3].split(',').map(str::to_string).collect(),
            dump: fields.get(4).unwrap_or(&"0").to_string(),
            pass: fields.get(5).unwrap_or(&"0").to_string(),
        })
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|existing| existing == option)
    }

    /// Returns `false` when the option was already present.
    pub fn add_option(&mut self, option: &str) -> bool {
        if self.has_option(option) {
            return false;
        }
        self.options.push(option.to_string());
        true
    }

    fn render(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.device,
            self.mount_point,
            self.fs_type,
            self.options.join(","),
            self.dump,
            self.pass
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { entry: FstabEntry, raw: String },
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fstab {
    lines: Vec<Line>,
}

impl Fstab {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|raw| match FstabEntry::parse(raw) {
                Some(entry) => Line::Entry {
                    entry,
                    raw: raw.to_string(),
                },
                None => Line::Other(raw.to_string()),
            })
            .collect();
        Self { lines }
    }

    pub fn entries(&self) -> impl Iterator<Item = &FstabEntry> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { entry, .. } => Some(entry),
            Line::Other(_) => None,
        })
    }

    /// The last row for a mount point is the one `mount` honours.
    pub fn entry(&self, mount_point: &str) -> Option<&FstabEntry> {
        self.entries()
            .filter(|entry| same_mount(&entry.mount_point, mount_point))
            .last()
    }

    pub fn entry_mut(&mut self, mount_point: &str) -> Option<&mut FstabEntry> {
        self.lines.iter_mut().rev().find_map(|line| match line {
            Line::Entry { entry, .. } if same_mount(&entry.mount_point, mount_point) => {
                Some(entry)
            }
            _ => None,
        })
    }

    /// Untouched rows keep their original spacing.
    pub fn render(&self) -> String {
        let lines = self
            .lines
            .iter()
            .map(|line| match line {
                Line::Entry { entry, raw } => {
                    if FstabEntry::parse(raw).as_ref() == Some(entry) {
                        raw.clone()
                    } else {
                        entry.render()
                    }
                }
                Line::Other(raw) => raw.clone(),
            })
            .collect::<Vec<_>>();
        join_lines(&lines)
    }
}

fn same_mount(a: &str, b: &str) -> bool {
    let normalize = |value: &str| {
        if value == "/" {
            "/".to_string()
        } else {
            value.trim_end_matches('/').to_string()
        }
    };
    normalize(a) == normalize(b)
}
