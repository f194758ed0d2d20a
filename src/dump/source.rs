use super::EntityKind;
use crate::sync::Period;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const READ_BUFFER_BYTES: usize = 1 << 20;

/// Where the dumps of a period come from.
pub trait DumpSource: Send + Sync {
    /// Open the `kind` dump published for `period`.
    fn open(&self, period: Period, kind: EntityKind) -> Result<Box<dyn BufRead + Send>>;

    /// Periods for which every entity kind is available, oldest first.
    fn available_periods(&self) -> Result<Vec<Period>>;

    fn latest_period(&self) -> Result<Option<Period>> {
        Ok(self.available_periods()?.pop())
    }
}

/// Dumps stored as plain XML files in one directory, named like
/// `discogs_20250101_releases.xml`.
pub struct DirectoryDumpSource {
    dir: PathBuf,
    file_pattern: Regex,
}

struct DumpFile {
    period: Period,
    kind: EntityKind,
    path: PathBuf,
}

impl DirectoryDumpSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            bail!("Dump directory does not exist: {:?}", dir);
        }
        Ok(Self {
            dir,
            file_pattern: Regex::new(r"^discogs_(\d{4})(\d{2})\d{2}_(artists|labels|masters|releases)\.xml$")?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(date: &str, kind: EntityKind) -> String {
        format!("discogs_{}_{}.xml", date, kind.container())
    }

    fn list_files(&self) -> Result<Vec<DumpFile>> {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list dump directory {:?}", self.dir))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(caps) = self.file_pattern.captures(name) else {
                continue;
            };
            let Ok(period) = format!("{}-{}", &caps[1], &caps[2]).parse::<Period>() else {
                continue;
            };
            let Some(kind) = EntityKind::from_container(&caps[3]) else {
                continue;
            };
            files.push(DumpFile {
                period,
                kind,
                path: entry.path(),
            });
        }
        // Within a month the latest publication date wins
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

impl DumpSource for DirectoryDumpSource {
    fn open(&self, period: Period, kind: EntityKind) -> Result<Box<dyn BufRead + Send>> {
        let path = self
            .list_files()?
            .into_iter()
            .filter(|f| f.period == period && f.kind == kind)
            .last()
            .map(|f| f.path)
            .with_context(|| format!("No {} dump for {} in {:?}", kind, period, self.dir))?;
        let file = File::open(&path).with_context(|| format!("Failed to open {:?}", path))?;
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, file)))
    }

    fn available_periods(&self) -> Result<Vec<Period>> {
        let files = self.list_files()?;
        let mut periods: Vec<Period> = files.iter().map(|f| f.period).collect();
        periods.sort();
        periods.dedup();
        periods.retain(|period| {
            EntityKind::IMPORT_ORDER
                .iter()
                .all(|kind| files.iter().any(|f| f.period == *period && f.kind == *kind))
        });
        Ok(periods)
    }
}
