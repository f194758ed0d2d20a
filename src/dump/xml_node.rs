use quick_xml::events::BytesStart;

/// An element of one dump record, with its attributes, text and children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Build a childless node from a start (or empty) tag.
    pub(super) fn from_start(e: &BytesStart<'_>) -> Result<Self, String> {
        let mut node = XmlNode::new(String::from_utf8_lossy(e.name().as_ref()));
        for attr in e.attributes() {
            let attr = attr.map_err(|err| err.to_string())?;
            let value = attr.unescape_value().map_err(|err| err.to_string())?;
            node.attributes.push((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value.into_owned(),
            ));
        }
        Ok(node)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// Trimmed text of the first child called `name`, `None` when missing or
    /// empty.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(XmlNode::text)
    }

    /// Texts of the `item` children of the `list` child, e.g. the `<genre>`
    /// entries of `<genres>`.
    pub fn list_texts(&self, list: &str, item: &str) -> Vec<String> {
        self.child(list)
            .map(|node| {
                node.children_named(item)
                    .filter_map(XmlNode::text)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
