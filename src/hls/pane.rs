use std::path::PathBuf;

/// One rendered playlist record: the tag lines and URI for a single segment.
#[derive(Debug, Clone)]
pub struct Pane {
    /// Tags in insertion order. A `None` value renders the tag bare
    /// (`#EXT-X-DISCONTINUITY`).
    tags: Vec<(String, Option<String>)>,
    /// Relative URI as written into the playlist.
    pub uri: String,
    /// Full path of the segment file on disk.
    pub path: PathBuf,
    /// Segment sequence number.
    pub num: u64,
}

impl Pane {
    pub fn new(uri: impl Into<String>, path: impl Into<PathBuf>, num: u64) -> Self {
        Self {
            tags: Vec::new(),
            uri: uri.into(),
            path: path.into(),
            num,
        }
    }

    /// Add a tag, or replace its value in place when already present.
    pub fn add_tag(&mut self, tag: &str, value: Option<String>) {
        if let Some(slot) = self.tags.iter_mut().find(|(t, _)| t == tag) {
            slot.1 = value;
        } else {
            self.tags.push((tag.to_string(), value));
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|(t, _)| t == tag)
    }

    /// Render the tag lines followed by the URI, newline terminated.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.tags.len() + 1);
        for (tag, value) in &self.tags {
            match value {
                Some(value) => lines.push(format!("{tag}:{value}")),
                None => lines.push(tag.clone()),
            }
        }
        lines.push(self.uri.clone());
        lines.push(String::new());
        lines.join("\n")
    }
}
