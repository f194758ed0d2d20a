//! Reading the monthly catalog dumps.
//!
//! Each dump is one XML document per entity kind, a root container
//! (`<labels>`, `<artists>`, ...) wrapping one element per record. The
//! decoder walks it incrementally and only ever holds a single record in
//! memory.

mod decoder;
mod filter;
mod records;
mod source;
mod xml_node;

pub use decoder::{DecodeError, DecodeStats, DumpDecoder};
pub use filter::{EarlyFilter, ReleaseFormatFilter, DEFAULT_RELEASE_FORMAT};
pub use records::{DumpRecord, RecordError};
pub use source::{DirectoryDumpSource, DumpSource};
pub use xml_node::XmlNode;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The entity kinds published as separate dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Label,
    Artist,
    Master,
    Release,
}

impl EntityKind {
    /// Processing order. Entities referenced by associations come first.
    pub const IMPORT_ORDER: [EntityKind; 4] = [
        EntityKind::Label,
        EntityKind::Artist,
        EntityKind::Master,
        EntityKind::Release,
    ];

    /// Name of the dump's root element, also used in dump file names.
    pub fn container(&self) -> &'static str {
        match self {
            EntityKind::Label => "labels",
            EntityKind::Artist => "artists",
            EntityKind::Master => "masters",
            EntityKind::Release => "releases",
        }
    }

    /// Name of one record element.
    pub fn element(&self) -> &'static str {
        match self {
            EntityKind::Label => "label",
            EntityKind::Artist => "artist",
            EntityKind::Master => "master",
            EntityKind::Release => "release",
        }
    }

    pub fn from_container(name: &str) -> Option<Self> {
        Self::IMPORT_ORDER
            .into_iter()
            .find(|kind| kind.container() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.container())
    }
}
