/// A remote gist as the discovery engine sees it
///
/// Only metadata here - contents are fetched separately and only when the
/// match policy asks for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub id: String,
    pub owner: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub file_names: Vec<String>,
    /// At least one file reports a non-zero size
    pub has_content: bool,
}

impl RemoteItem {
    /// Description followed by every file name, space separated
    pub fn metadata_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.file_names.len() + 1);

        if let Some(desc) = self.description.as_deref() {
            parts.push(desc);
        }
        parts.extend(self.file_names.iter().map(String::as_str));

        parts.join(" ").trim().to_string()
    }
}

/// One page from a listing source
#[derive(Debug, Clone, Default)]
pub struct RemotePage {
    pub items: Vec<RemoteItem>,
    /// Opaque cursor for the following page, `None` on the last one
    pub next: Option<String>,
}
