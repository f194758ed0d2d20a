//! Synthetic dump files.

use std::io::{BufRead, Read};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use vinyl_catalog_sync::dump::{DirectoryDumpSource, EntityKind};

#[derive(Debug, Clone)]
pub struct ReleaseFixture {
    pub id: i64,
    pub title: String,
    pub formats: Vec<String>,
    pub artist_ids: Vec<i64>,
    pub label_ids: Vec<i64>,
    pub genres: Vec<String>,
}

impl ReleaseFixture {
    pub fn new(id: i64, title: &str, format: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            formats: vec![format.to_string()],
            artist_ids: Vec::new(),
            label_ids: Vec::new(),
            genres: Vec::new(),
        }
    }

    pub fn formats(mut self, formats: &[&str]) -> Self {
        self.formats = formats.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn artists(mut self, ids: &[i64]) -> Self {
        self.artist_ids = ids.to_vec();
        self
    }

    pub fn labels(mut self, ids: &[i64]) -> Self {
        self.label_ids = ids.to_vec();
        self
    }

    pub fn genres(mut self, genres: &[&str]) -> Self {
        self.genres = genres.iter().map(|g| g.to_string()).collect();
        self
    }

    fn to_xml(&self) -> String {
        let mut xml = format!("<release id=\"{}\"><title>{}</title>", self.id, self.title);
        xml.push_str(&artists_xml(&self.artist_ids));
        xml.push_str("<labels>");
        for label in &self.label_ids {
            xml.push_str(&format!("<label id=\"{}\" catno=\"CAT-{}\"/>", label, label));
        }
        xml.push_str("</labels><formats>");
        for format in &self.formats {
            xml.push_str(&format!("<format name=\"{}\" qty=\"1\"/>", format));
        }
        xml.push_str("</formats>");
        xml.push_str(&genres_xml(&self.genres));
        xml.push_str("</release>");
        xml
    }
}

fn artists_xml(ids: &[i64]) -> String {
    let artists: String = ids
        .iter()
        .map(|id| format!("<artist><id>{}</id><name>Artist {}</name></artist>", id, id))
        .collect();
    format!("<artists>{}</artists>", artists)
}

fn genres_xml(genres: &[String]) -> String {
    let genres: String = genres
        .iter()
        .map(|g| format!("<genre>{}</genre>", g))
        .collect();
    format!("<genres>{}</genres>", genres)
}

/// The four dumps of one publication date, built record by record.
#[derive(Debug, Clone)]
pub struct DumpSet {
    date: String,
    labels: Vec<String>,
    artists: Vec<String>,
    masters: Vec<String>,
    releases: Vec<String>,
}

impl DumpSet {
    /// `date` is the publication date as `YYYYMMDD`.
    pub fn new(date: &str) -> Self {
        Self {
            date: date.to_string(),
            labels: Vec::new(),
            artists: Vec::new(),
            masters: Vec::new(),
            releases: Vec::new(),
        }
    }

    /// Same records, published on another date.
    pub fn republished(&self, date: &str) -> Self {
        Self {
            date: date.to_string(),
            ..self.clone()
        }
    }

    pub fn label(mut self, id: i64, name: &str) -> Self {
        self.labels.push(format!(
            "<label><id>{}</id><name>{}</name></label>",
            id, name
        ));
        self
    }

    pub fn artist(mut self, id: i64, name: &str) -> Self {
        self.artists.push(format!(
            "<artist><id>{}</id><name>{}</name></artist>",
            id, name
        ));
        self
    }

    /// A raw record appended to the artists dump as is.
    pub fn raw_artist(mut self, xml: &str) -> Self {
        self.artists.push(xml.to_string());
        self
    }

    pub fn master(mut self, id: i64, title: &str, artist_ids: &[i64], genres: &[&str]) -> Self {
        let genres: Vec<String> = genres.iter().map(|g| g.to_string()).collect();
        self.masters.push(format!(
            "<master id=\"{}\"><title>{}</title>{}{}</master>",
            id,
            title,
            artists_xml(artist_ids),
            genres_xml(&genres)
        ));
        self
    }

    pub fn release(mut self, release: ReleaseFixture) -> Self {
        self.releases.push(release.to_xml());
        self
    }

    pub fn xml(&self, kind: EntityKind) -> String {
        let records = match kind {
            EntityKind::Label => &self.labels,
            EntityKind::Artist => &self.artists,
            EntityKind::Master => &self.masters,
            EntityKind::Release => &self.releases,
        };
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<{container}>\n{}\n</{container}>\n",
            records.join("\n"),
            container = kind.container()
        )
    }

    /// Write all four files into `dir`.
    pub fn write(&self, dir: &Path) {
        for kind in EntityKind::IMPORT_ORDER {
            self.write_kind(dir, kind);
        }
    }

    /// Write every file except the `missing` one.
    pub fn write_without(&self, dir: &Path, missing: EntityKind) {
        for kind in EntityKind::IMPORT_ORDER {
            if kind != missing {
                self.write_kind(dir, kind);
            }
        }
    }

    pub fn write_kind(&self, dir: &Path, kind: EntityKind) {
        let path = dir.join(DirectoryDumpSource::file_name(&self.date, kind));
        std::fs::write(&path, self.xml(kind)).unwrap();
    }
}

/// A stream that requests cancellation the first time it is read.
pub struct CancelOnRead<R> {
    inner: R,
    token: CancellationToken,
}

impl<R> CancelOnRead<R> {
    pub fn new(inner: R, token: CancellationToken) -> Self {
        Self { inner, token }
    }
}

impl<R: Read> Read for CancelOnRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.token.cancel();
        self.inner.read(buf)
    }
}

impl<R: BufRead> BufRead for CancelOnRead<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.token.cancel();
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}
