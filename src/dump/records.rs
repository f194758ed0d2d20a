//! Mapping of dump elements to catalog entities.

use super::xml_node::XmlNode;
use super::EntityKind;
use crate::catalog_store::{Artist, Label, Master, Release, ReleaseFormat, ReleaseLabel, Track};
use std::str::FromStr;
use thiserror::Error;

/// Why a single record was skipped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing required {0}")]
    Missing(&'static str),

    #[error("invalid {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("malformed XML: {0}")]
    Syntax(String),
}

/// A catalog entity that can be read from its dump element.
pub trait DumpRecord: Sized {
    const KIND: EntityKind;

    fn from_node(node: &XmlNode) -> Result<Self, RecordError>;
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, RecordError> {
    value.trim().parse().map_err(|_| RecordError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

/// Identifier in the record's `id` attribute or, failing that, its `<id>`
/// child.
fn record_id(node: &XmlNode) -> Result<i64, RecordError> {
    let raw = node
        .attr("id")
        .or_else(|| node.child_text("id"))
        .ok_or(RecordError::Missing("id"))?;
    parse_number("id", raw)
}

fn required_text(node: &XmlNode, child: &'static str) -> Result<String, RecordError> {
    node.child_text(child)
        .map(str::to_string)
        .ok_or(RecordError::Missing(child))
}

fn optional_text(node: &XmlNode, child: &str) -> Option<String> {
    node.child_text(child).map(str::to_string)
}

fn optional_number<T: FromStr>(node: &XmlNode, child: &'static str) -> Result<Option<T>, RecordError> {
    node.child_text(child)
        .map(|text| parse_number(child, text))
        .transpose()
}

fn sorted_set<T: Ord>(mut values: Vec<T>) -> Vec<T> {
    values.sort();
    values.dedup();
    values
}

/// Ids of the `<artist><id>` entries under `<artists>`. Credits without an id
/// are ignored.
fn credited_artist_ids(node: &XmlNode) -> Result<Vec<i64>, RecordError> {
    let mut ids = Vec::new();
    if let Some(artists) = node.child("artists") {
        for artist in artists.children_named("artist") {
            if let Some(id) = artist.child_text("id") {
                ids.push(parse_number("artist id", id)?);
            }
        }
    }
    Ok(sorted_set(ids))
}

/// Year as published, where `0` means unknown.
fn known_year(year: Option<i32>) -> Option<i32> {
    year.filter(|y| *y > 0)
}

/// Year of a `released` date such as `1999-03-00`, `1999` or `1999-03-17`.
fn year_of_released(released: &str) -> Option<i32> {
    released
        .get(..4)
        .and_then(|year| year.parse().ok())
        .filter(|year: &i32| *year > 0)
}

impl DumpRecord for Label {
    const KIND: EntityKind = EntityKind::Label;

    fn from_node(node: &XmlNode) -> Result<Self, RecordError> {
        let parent_label_id = node
            .child("parentLabel")
            .and_then(|parent| parent.attr("id"))
            .map(|id| parse_number("parent label id", id))
            .transpose()?;

        Ok(Label {
            id: record_id(node)?,
            name: required_text(node, "name")?,
            contact_info: optional_text(node, "contactinfo"),
            profile: optional_text(node, "profile"),
            parent_label_id,
            data_quality: optional_text(node, "data_quality"),
            content_hash: String::new(),
        })
    }
}

impl DumpRecord for Artist {
    const KIND: EntityKind = EntityKind::Artist;

    fn from_node(node: &XmlNode) -> Result<Self, RecordError> {
        Ok(Artist {
            id: record_id(node)?,
            name: required_text(node, "name")?,
            real_name: optional_text(node, "realname"),
            profile: optional_text(node, "profile"),
            data_quality: optional_text(node, "data_quality"),
            name_variations: sorted_set(node.list_texts("namevariations", "name")),
            content_hash: String::new(),
        })
    }
}

impl DumpRecord for Master {
    const KIND: EntityKind = EntityKind::Master;

    fn from_node(node: &XmlNode) -> Result<Self, RecordError> {
        Ok(Master {
            id: record_id(node)?,
            title: required_text(node, "title")?,
            year: known_year(optional_number(node, "year")?),
            main_release_id: optional_number(node, "main_release")?,
            data_quality: optional_text(node, "data_quality"),
            genres: sorted_set(node.list_texts("genres", "genre")),
            styles: sorted_set(node.list_texts("styles", "style")),
            artist_ids: credited_artist_ids(node)?,
            content_hash: String::new(),
        })
    }
}

fn release_format(node: &XmlNode) -> Result<ReleaseFormat, RecordError> {
    let name = node
        .attr("name")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(RecordError::Missing("format name"))?;
    let quantity = node
        .attr("qty")
        .map(str::trim)
        .filter(|qty| !qty.is_empty())
        .map(|qty| parse_number("format quantity", qty))
        .transpose()?;

    Ok(ReleaseFormat {
        name: name.to_string(),
        quantity,
        text: node
            .attr("text")
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string),
        descriptions: node.list_texts("descriptions", "description"),
    })
}

fn release_labels(node: &XmlNode) -> Result<Vec<ReleaseLabel>, RecordError> {
    let mut labels = Vec::new();
    if let Some(list) = node.child("labels") {
        for label in list.children_named("label") {
            let Some(id) = label.attr("id").map(str::trim).filter(|id| !id.is_empty()) else {
                continue;
            };
            labels.push(ReleaseLabel {
                label_id: parse_number("label id", id)?,
                catalog_number: label
                    .attr("catno")
                    .map(str::trim)
                    .filter(|catno| !catno.is_empty())
                    .map(str::to_string),
            });
        }
    }
    Ok(sorted_set(labels))
}

fn tracklist(node: &XmlNode) -> Vec<Track> {
    node.child("tracklist")
        .map(|list| {
            list.children_named("track")
                .map(|track| Track {
                    position: track.child_text("position").unwrap_or_default().to_string(),
                    title: track.child_text("title").unwrap_or_default().to_string(),
                    duration: optional_text(track, "duration"),
                })
                .collect()
        })
        .unwrap_or_default()
}

impl DumpRecord for Release {
    const KIND: EntityKind = EntityKind::Release;

    fn from_node(node: &XmlNode) -> Result<Self, RecordError> {
        let formats = node
            .child("formats")
            .map(|list| {
                list.children_named("format")
                    .map(release_format)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        let released = optional_text(node, "released");

        Ok(Release {
            id: record_id(node)?,
            title: required_text(node, "title")?,
            country: optional_text(node, "country"),
            year: released.as_deref().and_then(year_of_released),
            released,
            master_id: optional_number(node, "master_id")?,
            data_quality: optional_text(node, "data_quality"),
            formats,
            tracklist: tracklist(node),
            genres: sorted_set(node.list_texts("genres", "genre")),
            styles: sorted_set(node.list_texts("styles", "style")),
            artist_ids: credited_artist_ids(node)?,
            labels: release_labels(node)?,
            content_hash: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, text: &str) -> XmlNode {
        let mut node = XmlNode::new(name);
        node.text = text.to_string();
        node
    }

    fn with_attr(mut node: XmlNode, key: &str, value: &str) -> XmlNode {
        node.attributes.push((key.to_string(), value.to_string()));
        node
    }

    fn list(name: &str, item: &str, values: &[&str]) -> XmlNode {
        let mut node = XmlNode::new(name);
        node.children = values.iter().map(|v| leaf(item, v)).collect();
        node
    }

    fn artists(ids: &[&str]) -> XmlNode {
        let mut node = XmlNode::new("artists");
        for id in ids {
            let mut artist = XmlNode::new("artist");
            artist.children.push(leaf("id", id));
            artist.children.push(leaf("name", "Someone"));
            node.children.push(artist);
        }
        node
    }

    #[test]
    fn test_label() {
        let mut node = XmlNode::new("label");
        node.children = vec![
            leaf("id", "5"),
            leaf("name", "Svek"),
            leaf("profile", "Swedish label"),
            with_attr(leaf("parentLabel", "Parent"), "id", "12"),
        ];
        let label = Label::from_node(&node).unwrap();
        assert_eq!(label.id, 5);
        assert_eq!(label.name, "Svek");
        assert_eq!(label.parent_label_id, Some(12));
        assert_eq!(label.contact_info, None);
    }

    #[test]
    fn test_artist_name_variations_sorted() {
        let mut node = XmlNode::new("artist");
        node.children = vec![
            leaf("id", "1"),
            leaf("name", "The Persuader"),
            list("namevariations", "name", &["Persuader", "Dahlback", "Persuader"]),
        ];
        let artist = Artist::from_node(&node).unwrap();
        assert_eq!(artist.name_variations, vec!["Dahlback", "Persuader"]);
    }

    #[test]
    fn test_master() {
        let mut node = with_attr(XmlNode::new("master"), "id", "10");
        node.children = vec![
            leaf("main_release", "42"),
            artists(&["2", "1", "2"]),
            list("genres", "genre", &["Rock", "Electronic"]),
            list("styles", "style", &["Techno"]),
            leaf("year", "0"),
            leaf("title", "Stockholm"),
        ];
        let master = Master::from_node(&node).unwrap();
        assert_eq!(master.id, 10);
        assert_eq!(master.year, None);
        assert_eq!(master.main_release_id, Some(42));
        assert_eq!(master.artist_ids, vec![1, 2]);
        assert_eq!(master.genres, vec!["Electronic", "Rock"]);
    }

    #[test]
    fn test_release() {
        let mut formats = XmlNode::new("formats");
        formats.children.push(with_attr(
            with_attr(XmlNode::new("format"), "name", "Vinyl"),
            "qty",
            "2",
        ));
        let mut labels = XmlNode::new("labels");
        labels.children.push(with_attr(
            with_attr(XmlNode::new("label"), "id", "5"),
            "catno",
            "SK032",
        ));
        labels.children.push(with_attr(XmlNode::new("label"), "name", "No id"));
        let mut tracks = XmlNode::new("tracklist");
        let mut track = XmlNode::new("track");
        track.children = vec![leaf("position", "A"), leaf("title", "Östermalm"), leaf("duration", "4:45")];
        tracks.children.push(track);

        let mut node = with_attr(XmlNode::new("release"), "id", "1");
        node.children = vec![
            artists(&["1"]),
            leaf("title", "Stockholm"),
            labels,
            formats,
            list("genres", "genre", &["Electronic"]),
            leaf("country", "Sweden"),
            leaf("released", "1999-03-00"),
            with_attr(leaf("master_id", "10"), "is_main_release", "true"),
            tracks,
        ];

        let release = Release::from_node(&node).unwrap();
        assert_eq!(release.year, Some(1999));
        assert_eq!(release.master_id, Some(10));
        assert_eq!(release.primary_format(), Some("Vinyl"));
        assert_eq!(release.formats[0].quantity, Some(2));
        assert_eq!(
            release.labels,
            vec![ReleaseLabel {
                label_id: 5,
                catalog_number: Some("SK032".to_string())
            }]
        );
        assert_eq!(release.tracklist[0].duration.as_deref(), Some("4:45"));
    }

    #[test]
    fn test_record_errors() {
        let node = with_attr(XmlNode::new("master"), "id", "abc");
        assert_eq!(
            Master::from_node(&node).unwrap_err(),
            RecordError::InvalidValue {
                field: "id",
                value: "abc".to_string()
            }
        );

        let node = with_attr(XmlNode::new("master"), "id", "3");
        assert_eq!(
            Master::from_node(&node).unwrap_err(),
            RecordError::Missing("title")
        );

        let mut node = XmlNode::new("artist");
        node.children.push(leaf("name", "No id"));
        assert_eq!(Artist::from_node(&node).unwrap_err(), RecordError::Missing("id"));
    }

    #[test]
    fn test_year_of_released() {
        assert_eq!(year_of_released("1977"), Some(1977));
        assert_eq!(year_of_released("1977-02-04"), Some(1977));
        assert_eq!(year_of_released("0000-00-00"), None);
        assert_eq!(year_of_released("Unknown"), None);
        assert_eq!(year_of_released("19"), None);
    }
}
