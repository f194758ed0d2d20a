//! Streaming decoder for one dump document.
//!
//! The decoder is an [`Iterator`] of decoded records. Problems confined to a
//! single record are counted in [`DecodeStats::errors`] and the record is
//! skipped. Problems with the stream itself end iteration with one
//! [`DecodeError`].

use super::filter::EarlyFilter;
use super::records::{DumpRecord, RecordError};
use super::xml_node::XmlNode;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Syntax errors tolerated inside one record before the stream is deemed
/// unreadable.
const MAX_SYNTAX_ERRORS_PER_RECORD: usize = 64;

/// A failure that makes the rest of the stream unusable.
#[derive(Debug, Error, Clone)]
pub enum DecodeError {
    #[error("I/O error reading dump: {0}")]
    Io(Arc<std::io::Error>),

    #[error("expected root element <{expected}>, found <{found}>")]
    WrongRoot { expected: &'static str, found: String },

    #[error("dump has no <{0}> root element")]
    MissingRoot(&'static str),

    #[error("dump ended inside <{0}>")]
    UnexpectedEof(String),

    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: usize, message: String },
}

/// Running counters of one decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Records successfully mapped and yielded.
    pub decoded: u64,
    /// Records dropped by the early filter.
    pub filtered: u64,
    /// Records skipped because of a record-level error.
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeRoot,
    InContainer,
    Done,
}

/// How reading one record element ended.
enum RecordOutcome<T> {
    Decoded(T),
    Filtered,
    Failed(RecordError),
}

pub struct DumpDecoder<R: BufRead, T: DumpRecord> {
    reader: Reader<R>,
    buf: Vec<u8>,
    filter: Option<Box<dyn EarlyFilter>>,
    stats: DecodeStats,
    state: State,
    _record: PhantomData<fn() -> T>,
}

impl<R: BufRead, T: DumpRecord> DumpDecoder<R, T> {
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        // End tags are matched against our own element stack so that a
        // mismatch stays a record-level problem.
        reader.check_end_names(false);
        Self {
            reader,
            buf: Vec::new(),
            filter: None,
            stats: DecodeStats::default(),
            state: State::BeforeRoot,
            _record: PhantomData,
        }
    }

    pub fn with_filter(mut self, filter: Box<dyn EarlyFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    fn byte_position(&self) -> usize {
        self.reader.buffer_position()
    }

    fn fatal(&mut self, error: DecodeError) -> Option<Result<T, DecodeError>> {
        self.state = State::Done;
        Some(Err(error))
    }

    fn stream_error(&self, error: quick_xml::Error) -> DecodeError {
        match error {
            quick_xml::Error::Io(io) => DecodeError::Io(io),
            other => DecodeError::Syntax {
                position: self.byte_position(),
                message: other.to_string(),
            },
        }
    }

    /// Advance to the root element and check its name.
    fn open_root(&mut self) -> Result<(), DecodeError> {
        let expected = T::KIND.container();
        loop {
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map(Event::into_owned);
            self.buf.clear();
            match event {
                Ok(Event::Start(e)) => {
                    let found = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if found != expected {
                        return Err(DecodeError::WrongRoot { expected, found });
                    }
                    self.state = State::InContainer;
                    return Ok(());
                }
                Ok(Event::Empty(e)) => {
                    let found = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if found != expected {
                        return Err(DecodeError::WrongRoot { expected, found });
                    }
                    // A container without records
                    self.state = State::Done;
                    return Ok(());
                }
                Ok(Event::Eof) => return Err(DecodeError::MissingRoot(expected)),
                Ok(_) => continue,
                Err(e) => return Err(self.stream_error(e)),
            }
        }
    }

    /// Read the rest of a record whose start tag was just consumed.
    ///
    /// `Err` is a stream failure; everything confined to the record is an
    /// [`RecordOutcome`].
    fn read_record(&mut self, start: &BytesStart<'_>, is_empty: bool) -> Result<RecordOutcome<T>, DecodeError> {
        let root = match XmlNode::from_start(start) {
            Ok(node) => node,
            Err(message) => {
                if !is_empty {
                    self.skip_element(1)?;
                }
                return Ok(RecordOutcome::Failed(RecordError::Syntax(message)));
            }
        };
        if is_empty {
            return Ok(self.finish_record(root, false));
        }

        let trigger = self.filter.as_ref().map(|f| f.trigger().to_string());
        let mut decided = false;
        let mut stack = vec![root];
        let mut buf = Vec::new();

        loop {
            let event = self.reader.read_event_into(&mut buf);
            let failure = match event {
                Ok(Event::Start(e)) => match XmlNode::from_start(&e) {
                    Ok(node) => {
                        stack.push(node);
                        None
                    }
                    // The element is open, so it counts towards the depth
                    Err(message) => Some((message, stack.len() + 1)),
                },
                Ok(Event::Empty(e)) => match XmlNode::from_start(&e) {
                    Ok(node) => {
                        if let Some(outcome) = self.attach(&mut stack, node, &trigger, &mut decided)? {
                            return Ok(outcome);
                        }
                        None
                    }
                    Err(message) => Some((message, stack.len())),
                },
                Ok(Event::Text(t)) => match t.unescape() {
                    Ok(text) => {
                        if let Some(top) = stack.last_mut() {
                            top.text.push_str(&text);
                        }
                        None
                    }
                    Err(e) => Some((e.to_string(), stack.len())),
                },
                Ok(Event::CData(c)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                    None
                }
                Ok(Event::End(e)) => {
                    let Some(node) = stack.pop() else {
                        return Err(DecodeError::Syntax {
                            position: self.byte_position(),
                            message: "unbalanced end tag".to_string(),
                        });
                    };
                    if e.name().as_ref() != node.name.as_bytes() {
                        let message = format!(
                            "expected </{}>, found </{}>",
                            node.name,
                            String::from_utf8_lossy(e.name().as_ref())
                        );
                        // The mismatched tag closed one level
                        Some((message, stack.len()))
                    } else if stack.is_empty() {
                        return Ok(self.finish_record(node, decided));
                    } else {
                        if let Some(outcome) = self.attach(&mut stack, node, &trigger, &mut decided)? {
                            return Ok(outcome);
                        }
                        None
                    }
                }
                Ok(Event::Eof) => {
                    let open = stack.first().map(|n| n.name.clone()).unwrap_or_default();
                    return Err(DecodeError::UnexpectedEof(open));
                }
                Ok(_) => None,
                Err(quick_xml::Error::Io(io)) => return Err(DecodeError::Io(io)),
                Err(e) => Some((e.to_string(), stack.len())),
            };
            buf.clear();

            if let Some((message, depth)) = failure {
                if depth > 0 {
                    self.skip_element(depth)?;
                }
                return Ok(RecordOutcome::Failed(RecordError::Syntax(message)));
            }
        }
    }

    /// Attach a completed element to its parent, running the early filter
    /// when a direct child of the record closes.
    fn attach(
        &mut self,
        stack: &mut [XmlNode],
        node: XmlNode,
        trigger: &Option<String>,
        decided: &mut bool,
    ) -> Result<Option<RecordOutcome<T>>, DecodeError> {
        if stack.len() == 1 && !*decided && trigger.as_deref() == Some(node.name.as_str()) {
            *decided = true;
            let accepted = self
                .filter
                .as_ref()
                .map(|filter| filter.accepts(&node))
                .unwrap_or(true);
            if !accepted {
                self.skip_element(1)?;
                return Ok(Some(RecordOutcome::Filtered));
            }
        }
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
        Ok(None)
    }

    fn finish_record(&self, node: XmlNode, decided: bool) -> RecordOutcome<T> {
        // A record the filter never saw lacks the element it filters on
        if self.filter.is_some() && !decided {
            return RecordOutcome::Filtered;
        }
        match T::from_node(&node) {
            Ok(record) => RecordOutcome::Decoded(record),
            Err(e) => RecordOutcome::Failed(e),
        }
    }

    /// Consume events until `depth` open elements have been closed, without
    /// building anything.
    fn skip_element(&mut self, mut depth: usize) -> Result<(), DecodeError> {
        let mut buf = Vec::new();
        let mut syntax_errors = 0;
        while depth > 0 {
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(_)) => depth += 1,
                Ok(Event::End(_)) => depth -= 1,
                Ok(Event::Eof) => {
                    return Err(DecodeError::UnexpectedEof(T::KIND.element().to_string()))
                }
                Ok(_) => {}
                Err(quick_xml::Error::Io(io)) => return Err(DecodeError::Io(io)),
                Err(e) => {
                    syntax_errors += 1;
                    if syntax_errors > MAX_SYNTAX_ERRORS_PER_RECORD {
                        return Err(DecodeError::Syntax {
                            position: self.byte_position(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            buf.clear();
        }
        Ok(())
    }

    fn record_outcome(&mut self, outcome: RecordOutcome<T>) -> Option<T> {
        match outcome {
            RecordOutcome::Decoded(record) => {
                self.stats.decoded += 1;
                Some(record)
            }
            RecordOutcome::Filtered => {
                self.stats.filtered += 1;
                None
            }
            RecordOutcome::Failed(error) => {
                self.stats.errors += 1;
                debug!(
                    kind = %T::KIND,
                    position = self.byte_position(),
                    "Skipping malformed record: {}",
                    error
                );
                None
            }
        }
    }
}

impl<R: BufRead, T: DumpRecord> Iterator for DumpDecoder<R, T> {
    type Item = Result<T, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let element = T::KIND.element();
        loop {
            match self.state {
                State::Done => return None,
                State::BeforeRoot => {
                    if let Err(e) = self.open_root() {
                        return self.fatal(e);
                    }
                }
                State::InContainer => {
                    let event = self
                        .reader
                        .read_event_into(&mut self.buf)
                        .map(Event::into_owned);
                    self.buf.clear();

                    let outcome = match event {
                        Ok(Event::Start(e)) if e.name().as_ref() == element.as_bytes() => {
                            self.read_record(&e, false)
                        }
                        Ok(Event::Empty(e)) if e.name().as_ref() == element.as_bytes() => {
                            self.read_record(&e, true)
                        }
                        Ok(Event::Start(e)) => {
                            debug!(
                                kind = %T::KIND,
                                "Skipping unexpected <{}> element",
                                String::from_utf8_lossy(e.name().as_ref())
                            );
                            match self.skip_element(1) {
                                Ok(()) => continue,
                                Err(e) => return self.fatal(e),
                            }
                        }
                        Ok(Event::End(_)) => {
                            self.state = State::Done;
                            return None;
                        }
                        Ok(Event::Eof) => {
                            return self
                                .fatal(DecodeError::UnexpectedEof(T::KIND.container().to_string()))
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            let error = self.stream_error(e);
                            return self.fatal(error);
                        }
                    };

                    match outcome {
                        Ok(outcome) => {
                            if let Some(record) = self.record_outcome(outcome) {
                                return Some(Ok(record));
                            }
                        }
                        Err(e) => return self.fatal(e),
                    }
                }
            }
        }
    }
}
