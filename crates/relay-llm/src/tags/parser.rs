//! Incremental `<tool>{json}</tool>` envelope parser.
//!
//! The parser never holds text back from the caller; it only keeps the
//! undecided suffix it needs to recognize markers split across chunks.
//!
//! After each character the parser finds the longest suffix of its buffer
//! that is also a prefix of some marker. A partial overlap defers the
//! decision. A full open marker starts an envelope and resets the buffer to
//! the marker text. A full close marker ends the envelope: the payload is
//! whatever lies between the last matching open marker and the close marker.
//! With no envelope open the buffer is trimmed to the surviving overlap, so
//! tag-free text costs no memory.
//!
//! While an envelope is open only open markers and that tool's own close
//! marker are decisive; other close markers are ordinary payload text.
//! This keeps every `Start` paired with exactly one `End` or `Error`: a
//! foreign close marker can never end or orphan the envelope in progress.

use serde_json::{Map, Value};

use crate::error::TagError;

/// Outcome of feeding text to a [`ToolTagParser`].
#[derive(Clone, Debug, PartialEq)]
pub enum TagEvent {
    /// An open marker completed.
    Start {
        /// Tool name.
        name: String,
    },
    /// A close marker completed and the payload parsed as a JSON object.
    End {
        /// Tool name.
        name: String,
        /// Parsed parameters.
        params: Map<String, Value>,
    },
    /// The envelope could not be delivered.
    Error {
        /// Tool name.
        name: String,
        /// Why.
        error: TagError,
    },
}

impl TagEvent {
    /// Tool name this event concerns.
    pub fn name(&self) -> &str {
        match self {
            Self::Start { name } | Self::End { name, .. } | Self::Error { name, .. } => name,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MarkerKind {
    Open,
    Close,
}

#[derive(Clone, Debug)]
struct Marker {
    tool: usize,
    kind: MarkerKind,
    text: String,
}

/// Streaming envelope parser for a fixed set of tool names.
#[derive(Clone, Debug)]
pub struct ToolTagParser {
    names: Vec<String>,
    markers: Vec<Marker>,
    buffer: String,
    open: Option<usize>,
}

impl ToolTagParser {
    /// Parser recognizing `<name>` / `</name>` for each name. Empty and
    /// duplicate names are ignored.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !name.is_empty() && !unique.contains(&name) {
                unique.push(name);
            }
        }
        let markers = unique
            .iter()
            .enumerate()
            .flat_map(|(tool, name)| {
                [
                    Marker {
                        tool,
                        kind: MarkerKind::Open,
                        text: format!("<{name}>"),
                    },
                    Marker {
                        tool,
                        kind: MarkerKind::Close,
                        text: format!("</{name}>"),
                    },
                ]
            })
            .collect();
        Self {
            names: unique,
            markers,
            buffer: String::new(),
            open: None,
        }
    }

    /// Tool names this parser recognizes.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name of the envelope currently open, if any.
    pub fn open_tool(&self) -> Option<&str> {
        self.open.map(|i| self.names[i].as_str())
    }

    /// Bytes currently held for marker matching.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one text fragment.
    pub fn push(&mut self, chunk: &str) -> Vec<TagEvent> {
        let mut events = Vec::new();
        for ch in chunk.chars() {
            self.buffer.push(ch);
            self.step(&mut events);
        }
        events
    }

    /// End of input. An envelope still open is closed as if its close
    /// marker had arrived, so every `Start` gets exactly one `End` or `Error`.
    pub fn finish(&mut self) -> Vec<TagEvent> {
        let mut events = Vec::new();
        if let Some(tool) = self.open {
            let close = self.marker_text(tool, MarkerKind::Close).to_owned();
            self.buffer.push_str(&close);
            self.close(tool, &mut events);
        }
        self.buffer.clear();
        events
    }

    fn step(&mut self, events: &mut Vec<TagEvent>) {
        let Some((index, len)) = self.best_overlap() else {
            if self.open.is_none() {
                self.buffer.clear();
            }
            return;
        };

        let marker = &self.markers[index];
        if len == marker.text.len() {
            let (tool, kind) = (marker.tool, marker.kind);
            match kind {
                MarkerKind::Open => self.start(tool, events),
                MarkerKind::Close => self.close(tool, events),
            }
        } else if self.open.is_none() {
            let keep_from = self.buffer.len() - len;
            let _ = self.buffer.drain(..keep_from);
        }
    }

    /// Longest buffer suffix that prefixes a decisive marker. Ties go to a
    /// complete marker.
    fn best_overlap(&self) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, bool)> = None;
        for (index, marker) in self.markers.iter().enumerate() {
            let decisive = match (marker.kind, self.open) {
                (MarkerKind::Open, _) | (MarkerKind::Close, None) => true,
                (MarkerKind::Close, Some(open)) => open == marker.tool,
            };
            if !decisive {
                continue;
            }
            let len = overlap(&self.buffer, &marker.text);
            if len == 0 {
                continue;
            }
            let complete = len == marker.text.len();
            let better = match best {
                None => true,
                Some((_, best_len, best_complete)) => {
                    len > best_len || (len == best_len && complete && !best_complete)
                }
            };
            if better {
                best = Some((index, len, complete));
            }
        }
        best.map(|(index, len, _)| (index, len))
    }

    fn start(&mut self, tool: usize, events: &mut Vec<TagEvent>) {
        if let Some(previous) = self.open.take() {
            events.push(TagEvent::Error {
                name: self.names[previous].clone(),
                error: TagError::Superseded {
                    by: self.names[tool].clone(),
                },
            });
        }
        self.open = Some(tool);
        self.buffer = self.marker_text(tool, MarkerKind::Open).to_owned();
        events.push(TagEvent::Start {
            name: self.names[tool].clone(),
        });
    }

    fn close(&mut self, tool: usize, events: &mut Vec<TagEvent>) {
        let name = self.names[tool].clone();
        let open_text = self.marker_text(tool, MarkerKind::Open);
        let body_end = self.buffer.len() - self.marker_text(tool, MarkerKind::Close).len();

        let event = match self.buffer[..body_end].rfind(open_text) {
            None => TagEvent::Error {
                name,
                error: TagError::UnexpectedClosingTag,
            },
            Some(at) => match parse_payload(&self.buffer[at + open_text.len()..body_end]) {
                Ok(params) => TagEvent::End { name, params },
                Err(error) => TagEvent::Error { name, error },
            },
        };
        events.push(event);
        self.buffer.clear();
        self.open = None;
    }

    fn marker_text(&self, tool: usize, kind: MarkerKind) -> &str {
        let offset = match kind {
            MarkerKind::Open => 0,
            MarkerKind::Close => 1,
        };
        &self.markers[tool * 2 + offset].text
    }
}

/// Length of the longest suffix of `buffer` that is a prefix of `marker`.
fn overlap(buffer: &str, marker: &str) -> usize {
    let max = buffer.len().min(marker.len());
    (1..=max)
        .rev()
        .find(|&k| marker.is_char_boundary(k) && buffer.ends_with(&marker[..k]))
        .unwrap_or(0)
}

fn parse_payload(raw: &str) -> Result<Map<String, Value>, TagError> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(params)) => Ok(params),
        Ok(other) => Err(TagError::PayloadNotObject {
            found: json_type(&other),
        }),
        Err(e) => Err(TagError::InvalidPayload {
            reason: e.to_string(),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
