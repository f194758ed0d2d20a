use super::xml_node::XmlNode;

pub const DEFAULT_RELEASE_FORMAT: &str = "Vinyl";

/// A predicate evaluated on one direct child of a record as soon as that
/// child is complete. Records it rejects are dropped before the rest of their
/// element is read.
pub trait EarlyFilter: Send {
    /// Name of the child element the decision is made on.
    fn trigger(&self) -> &str;

    fn accepts(&self, child: &XmlNode) -> bool;
}

/// Keeps releases that list at least one format with the configured name.
///
/// ```xml
/// <formats>
///   <format name="Vinyl" qty="1" text=""><descriptions>...</descriptions></format>
/// </formats>
/// ```
#[derive(Debug, Clone)]
pub struct ReleaseFormatFilter {
    format: String,
}

impl ReleaseFormatFilter {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }
}

impl Default for ReleaseFormatFilter {
    fn default() -> Self {
        Self::new(DEFAULT_RELEASE_FORMAT)
    }
}

impl EarlyFilter for ReleaseFormatFilter {
    fn trigger(&self) -> &str {
        "formats"
    }

    fn accepts(&self, formats: &XmlNode) -> bool {
        formats.children_named("format").any(|format| {
            format
                .attr("name")
                .map(|name| name.trim().eq_ignore_ascii_case(&self.format))
                .unwrap_or(false)
        })
    }
}
