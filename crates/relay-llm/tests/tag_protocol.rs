//! Tool envelopes extracted from live text streams.

#![allow(missing_docs, unused_results)]

use std::sync::Arc;

use futures::{StreamExt, stream};
use parking_lot::Mutex;
use proptest::prelude::*;
use relay_core::messages::Message;
use relay_llm::mock::{MockAdapter, MockFactory, MockResponse, RecordingUsageSink};
use relay_llm::{
    CallRequest, DispatchResult, LiveInputRegistry, LlmClient, TagEvent, ToolHandlers,
    ToolTagParser, process_stream_with_tags,
};
use relay_settings::RelaySettings;
use serde_json::{Map, Value, json};

#[derive(Clone, Default)]
struct Calls {
    ends: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
    errors: Arc<Mutex<Vec<(String, String)>>>,
}

fn handlers(calls: &Calls) -> ToolHandlers {
    let (ends, errors) = (calls.ends.clone(), calls.errors.clone());
    let write_ends = ends.clone();
    ToolHandlers::new()
        .on_end("write", move |name, params| write_ends.lock().push((name.to_string(), params)))
        .on_end("search", move |name, params| ends.lock().push((name.to_string(), params)))
        .declare("shell")
        .on_error(move |name, message| errors.lock().push((name.to_string(), message.to_string())))
}

fn fragments(parts: Vec<String>) -> impl futures::Stream<Item = DispatchResult<String>> + Send + 'static {
    stream::iter(parts.into_iter().map(Ok))
}

#[tokio::test]
async fn envelopes_in_a_model_stream_reach_handlers() {
    let mock = MockAdapter::new();
    mock.push(
        "gpt-4o",
        MockResponse::text(&[
            "Let me check. <sea",
            "rch>{\"query\":\"tokio ",
            "timeout\"}</search> Then <shell>{\"cmd\":\"ls\"}</shell> and <write>{oops}</write>",
            " done.",
        ]),
    );
    let client = LlmClient::with_factory(
        &RelaySettings::default(),
        Arc::new(MockFactory::new(mock)),
        Arc::new(LiveInputRegistry::new(false)),
        Arc::new(RecordingUsageSink::default()),
    )
    .unwrap();

    let text = client
        .stream_text(CallRequest::new(vec![Message::user("hi")], "gpt-4o"))
        .await
        .unwrap()
        .completed()
        .unwrap();
    let calls = Calls::default();
    let out: Vec<String> = process_stream_with_tags(text, handlers(&calls))
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(
        out.concat(),
        "Let me check. <search>{\"query\":\"tokio timeout\"}</search> Then <shell>{\"cmd\":\"ls\"}</shell> and <write>{oops}</write> done."
    );

    let ends = calls.ends.lock().clone();
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].0, "search");
    assert_eq!(Value::Object(ends[0].1.clone()), json!({"query": "tokio timeout"}));

    let errors = calls.errors.lock().clone();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].0, "shell");
    assert!(errors[0].1.contains("no handler"));
    assert_eq!(errors[1].0, "write");
    assert!(errors[1].1.contains("invalid JSON"));
}

#[tokio::test]
async fn truncated_stream_still_resolves_open_envelope() {
    let calls = Calls::default();
    let out: Vec<String> = process_stream_with_tags(
        fragments(vec!["<write>{\"path\":\"a\",".into(), "\"body\":\"b\"}".into()]),
        handlers(&calls),
    )
    .map(Result::unwrap)
    .collect()
    .await;

    assert_eq!(out.len(), 2);
    let ends = calls.ends.lock().clone();
    assert_eq!(ends.len(), 1);
    assert_eq!(Value::Object(ends[0].1.clone()), json!({"path": "a", "body": "b"}));
    assert!(calls.errors.lock().is_empty());
}

fn events_for(chunks: &[&str]) -> Vec<TagEvent> {
    let mut parser = ToolTagParser::new(["write", "search"]);
    let mut events: Vec<TagEvent> = chunks.iter().flat_map(|c| parser.push(c)).collect();
    events.extend(parser.finish());
    events
}

#[test]
fn stray_marker_prefixes_leave_nothing_buffered() {
    let mut parser = ToolTagParser::new(["write", "search"]);
    let events: Vec<TagEvent> = ["</wri", "te oops <sea", "rc <b>x</b> done"]
        .iter()
        .flat_map(|c| parser.push(c))
        .collect();
    assert!(events.is_empty());
    assert_eq!(parser.open_tool(), None);
    assert_eq!(parser.buffered_len(), 0);
    assert!(parser.finish().is_empty());
}

const MARKERS: [&str; 6] = [
    "<write>", "</write>", "<search>", "</search>", "<shell>", "</shell>",
];

/// Text full of marker prefixes and foreign tags, but rarely a whole marker.
fn noisy_fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-z<>/ ]{0,12}",
        1 => Just("<wri".to_string()),
        1 => Just("</writ".to_string()),
        1 => Just("<sea".to_string()),
        1 => Just("</b>".to_string()),
        1 => Just("<b>x</b>".to_string()),
    ]
}

proptest! {
    #[test]
    fn tag_free_text_passes_through_untouched(
        parts in proptest::collection::vec(noisy_fragment(), 0..10),
    ) {
        let joined = parts.concat();
        prop_assume!(MARKERS.iter().all(|m| !joined.contains(m)));
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let calls = Calls::default();
        let out: Vec<String> = rt.block_on(
            process_stream_with_tags(fragments(parts.clone()), handlers(&calls))
                .map(Result::unwrap)
                .collect(),
        );
        prop_assert_eq!(out, parts);
        prop_assert!(calls.ends.lock().is_empty());
        prop_assert!(calls.errors.lock().is_empty());
    }

    #[test]
    fn fragmenting_never_changes_events(
        lead in "[a-z ]{0,10}",
        key in "[a-z]{1,8}",
        value in "[a-z0-9 ]{0,12}",
        sizes in proptest::collection::vec(1usize..6, 1..40),
    ) {
        let text = format!("{lead}<search>{{\"{key}\":\"{value}\"}}</search>{lead}");
        let whole = events_for(&[text.as_str()]);

        let mut chunks = Vec::new();
        let mut at = 0;
        for size in sizes.iter().cycle() {
            if at >= text.len() {
                break;
            }
            let end = (at + size).min(text.len());
            chunks.push(&text[at..end]);
            at = end;
        }
        prop_assert_eq!(events_for(&chunks), whole);
    }
}
