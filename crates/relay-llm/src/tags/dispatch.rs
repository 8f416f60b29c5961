//! Tool callbacks and the stream adapter that drives them.

use std::collections::HashMap;
use std::fmt;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::parser::{TagEvent, ToolTagParser};
use crate::error::{DispatchResult, TagError};

type StartFn = Box<dyn FnMut(&str) + Send>;
type EndFn = Box<dyn FnMut(&str, Map<String, Value>) + Send>;
type ErrorFn = Box<dyn FnMut(&str, &str) + Send>;

struct Handler {
    on_start: Option<StartFn>,
    on_end: EndFn,
}

/// Tool name → callbacks, plus one shared error callback.
///
/// Names added with [`ToolHandlers::declare`] are recognized in the text but
/// have no handler; their envelopes are reported as unknown tools.
#[derive(Default)]
pub struct ToolHandlers {
    handlers: HashMap<String, Handler>,
    declared: Vec<String>,
    on_error: Option<ErrorFn>,
}

impl fmt::Debug for ToolHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<_> = self.handlers.keys().collect();
        registered.sort();
        f.debug_struct("ToolHandlers")
            .field("registered", &registered)
            .field("declared", &self.declared)
            .finish_non_exhaustive()
    }
}

impl ToolHandlers {
    /// No tools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with start and end callbacks.
    #[must_use]
    pub fn on(
        mut self,
        name: impl Into<String>,
        on_start: impl FnMut(&str) + Send + 'static,
        on_end: impl FnMut(&str, Map<String, Value>) + Send + 'static,
    ) -> Self {
        let _ = self.handlers.insert(
            name.into(),
            Handler {
                on_start: Some(Box::new(on_start)),
                on_end: Box::new(on_end),
            },
        );
        self
    }

    /// Register `name` with an end callback only.
    #[must_use]
    pub fn on_end(
        mut self,
        name: impl Into<String>,
        on_end: impl FnMut(&str, Map<String, Value>) + Send + 'static,
    ) -> Self {
        let _ = self.handlers.insert(
            name.into(),
            Handler {
                on_start: None,
                on_end: Box::new(on_end),
            },
        );
        self
    }

    /// Recognize `name` without handling it.
    #[must_use]
    pub fn declare(mut self, name: impl Into<String>) -> Self {
        self.declared.push(name.into());
        self
    }

    /// Set the shared error callback `(tool name, message)`.
    #[must_use]
    pub fn on_error(mut self, on_error: impl FnMut(&str, &str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Whether `name` has a handler.
    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// A parser for every registered and declared name.
    pub fn parser(&self) -> ToolTagParser {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names.extend(self.declared.iter().map(String::as_str));
        ToolTagParser::new(names)
    }

    /// Route one parser event to its callback.
    pub fn dispatch(&mut self, event: TagEvent) {
        match event {
            TagEvent::Start { name } => {
                if let Some(handler) = self.handlers.get_mut(&name) {
                    debug!(tool = %name, "tool call started");
                    if let Some(on_start) = handler.on_start.as_mut() {
                        on_start(&name);
                    }
                }
            }
            TagEvent::End { name, params } => match self.handlers.get_mut(&name) {
                Some(handler) => {
                    debug!(tool = %name, param_count = params.len(), "tool call parsed");
                    (handler.on_end)(&name, params);
                }
                None => self.report(&name, &TagError::UnknownTool),
            },
            TagEvent::Error { name, error } => self.report(&name, &error),
        }
    }

    fn report(&mut self, name: &str, error: &TagError) {
        warn!(tool = %name, error = %error, "tool envelope rejected");
        metrics::counter!("relay_tag_errors_total").increment(1);
        if let Some(on_error) = self.on_error.as_mut() {
            on_error(name, &error.to_string());
        }
    }
}

/// Feed `text` through the tag parser, firing `handlers`, and yield every
/// fragment unchanged.
///
/// Callbacks for a fragment run before the fragment is yielded. When the
/// input ends, normally or with an error, an envelope still open is closed
/// so its end or error callback fires exactly once.
pub fn process_stream_with_tags<S>(
    text: S,
    mut handlers: ToolHandlers,
) -> impl Stream<Item = DispatchResult<String>> + Send
where
    S: Stream<Item = DispatchResult<String>> + Send + 'static,
{
    stream! {
        let mut parser = handlers.parser();
        let mut text = Box::pin(text);
        while let Some(item) = text.next().await {
            match item {
                Ok(fragment) => {
                    for event in parser.push(&fragment) {
                        handlers.dispatch(event);
                    }
                    yield Ok(fragment);
                }
                Err(e) => {
                    for event in parser.finish() {
                        handlers.dispatch(event);
                    }
                    yield Err(e);
                    return;
                }
            }
        }
        for event in parser.finish() {
            handlers.dispatch(event);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::stream;
    use parking_lot::Mutex;
    use relay_core::logging::capture_logs;
    use serde_json::json;
    use tracing::Level;

    use super::*;
    use crate::error::DispatchError;

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl Log {
        fn push(&self, line: String) {
            self.0.lock().push(line);
        }

        fn lines(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    fn handlers(log: &Log) -> ToolHandlers {
        let (start, end, err) = (log.clone(), log.clone(), log.clone());
        ToolHandlers::new()
            .on(
                "write",
                move |name| start.push(format!("start {name}")),
                move |name, params| end.push(format!("end {name} {}", Value::Object(params))),
            )
            .declare("deploy")
            .on_error(move |name, message| err.push(format!("error {name}: {message}")))
    }

    fn fragments(parts: &[&str]) -> stream::Iter<std::vec::IntoIter<DispatchResult<String>>> {
        let owned: Vec<DispatchResult<String>> = parts.iter().map(|p| Ok((*p).to_string())).collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn text_passes_through_and_callbacks_fire() {
        let log = Log::default();
        let out: Vec<String> = process_stream_with_tags(
            fragments(&["a <wri", "te>{\"x\":1}</write", "> b"]),
            handlers(&log),
        )
        .map(Result::unwrap)
        .collect()
        .await;
        assert_eq!(out.concat(), "a <write>{\"x\":1}</write> b");
        assert_eq!(log.lines(), vec!["start write".to_string(), format!("end write {}", json!({"x": 1}))]);
    }

    #[tokio::test]
    async fn declared_tool_without_handler_is_unknown() {
        let log = Log::default();
        let out: Vec<String> = process_stream_with_tags(
            fragments(&["<deploy>{\"env\":\"prod\"}</deploy> still here"]),
            handlers(&log),
        )
        .map(Result::unwrap)
        .collect()
        .await;
        assert_eq!(out, vec!["<deploy>{\"env\":\"prod\"}</deploy> still here"]);
        assert_eq!(log.lines(), vec!["error deploy: no handler registered for this tool"]);
    }

    #[tokio::test]
    async fn upstream_error_closes_open_envelope() {
        let log = Log::default();
        let input = stream::iter(vec![
            Ok("<write>{\"x\":2}".to_string()),
            Err(DispatchError::InvalidPlan("boom".into())),
        ]);
        let out: Vec<_> = process_stream_with_tags(input, handlers(&log)).collect().await;
        assert_eq!(out.len(), 2);
        assert!(out[1].is_err());
        assert_eq!(log.lines(), vec!["start write".to_string(), format!("end write {}", json!({"x": 2}))]);
    }

    #[test]
    fn rejected_envelope_is_logged() {
        let (logs, _guard) = capture_logs();
        let log = Log::default();
        let mut h = handlers(&log);
        h.dispatch(TagEvent::Error {
            name: "write".into(),
            error: TagError::UnexpectedClosingTag,
        });
        assert!(logs.has_event(Level::WARN, "tool envelope rejected"));
        assert_eq!(log.lines(), vec!["error write: unexpected closing tag"]);
    }

    #[test]
    fn parser_covers_registered_and_declared() {
        let h = handlers(&Log::default());
        let parser = h.parser();
        assert!(parser.names().iter().any(|n| n == "write"));
        assert!(parser.names().iter().any(|n| n == "deploy"));
        assert!(h.is_registered("write"));
        assert!(!h.is_registered("deploy"));
    }
}
