use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// Class id → label text, loaded once at startup.
///
/// The file format is one `<integer id> <label text>` pair per line. Label
/// text may contain spaces; blank lines are ignored.
#[derive(Clone, Debug, Default)]
pub struct LabelMap {
    labels: HashMap<i32, String>,
}

impl LabelMap {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid label file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut labels = HashMap::new();
        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (id, label) = match line.split_once(char::is_whitespace) {
                Some((id, label)) => (id, label.trim()),
                None => (line, ""),
            };
            let id: i32 = id
                .parse()
                .map_err(|_| anyhow!("line {}: class id {:?} is not an integer", lineno + 1, id))?;
            labels.insert(id, label.to_string());
        }
        Ok(Self { labels })
    }

    pub fn get(&self, class_id: i32) -> Option<&str> {
        self.labels.get(&class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
