use spaceflow::auth::{AccessToken, TokenGate};
use spaceflow::config::{
    ActionFilterConfig, GraphqlPassthroughConfig, HandlerConfig, LookupKey, PersonLookupConfig,
    SpaceCreateConfig, SpaceUpdateConfig,
};
use spaceflow::graphql::{ApiView, GraphqlClient};
use spaceflow::handlers::{dispatch, HandlerContext, HandlerError};
use spaceflow::queue::{InboundEvent, OutboundEvent};
use spaceflow::runtime::{bootstrap_state_root, drain_queue_once, StatePaths};
use spaceflow::template::PropertyValue;
use serde_json::json;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::tempdir;

#[derive(Debug, Clone)]
struct RecordedRequest {
    path: String,
    auth_header: String,
    view_header: String,
    body: String,
}

struct MockPlatformServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockPlatformServer {
    fn start<F>(expected_requests: usize, responder: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_for_thread = Arc::clone(&requests);
        let responder = Arc::new(responder);

        let handle = thread::spawn(move || {
            for _ in 0..expected_requests {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

                let mut request_line = String::new();
                reader
                    .read_line(&mut request_line)
                    .expect("read request line");
                let mut path = "/".to_string();
                if let Some(raw_path) = request_line.split_whitespace().nth(1) {
                    path = raw_path.to_string();
                }

                let mut auth_header = String::new();
                let mut view_header = String::new();
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).expect("read header");
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if lower.starts_with("authorization:") {
                        auth_header = line
                            .split_once(':')
                            .map(|(_, v)| v.trim().to_string())
                            .unwrap_or_default();
                    }
                    if lower.starts_with("x-graphql-view:") {
                        view_header = line
                            .split_once(':')
                            .map(|(_, v)| v.trim().to_string())
                            .unwrap_or_default();
                    }
                    if lower.starts_with("content-length:") {
                        content_length = line
                            .split_once(':')
                            .map(|(_, v)| v.trim().parse::<usize>().unwrap_or(0))
                            .unwrap_or(0);
                    }
                }

                let mut body = vec![0_u8; content_length];
                if content_length > 0 {
                    reader.read_exact(&mut body).expect("read body");
                }
                let body = String::from_utf8_lossy(&body).to_string();

                requests_for_thread
                    .lock()
                    .expect("lock requests")
                    .push(RecordedRequest {
                        path,
                        auth_header,
                        view_header,
                        body: body.clone(),
                    });

                let (status, response_body) = responder(&body);
                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response_body.len(),
                    response_body
                );
                stream
                    .write_all(response.as_bytes())
                    .expect("write response");
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
            handle: Some(handle),
        }
    }

    fn finish(mut self) -> Vec<RecordedRequest> {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("join mock server");
        }
        self.requests.lock().expect("lock requests").clone()
    }
}

fn body_json(request: &RecordedRequest) -> serde_json::Value {
    serde_json::from_str(&request.body).expect("request body is json")
}

fn platform_ctx(base_url: &str, state_root: &Path) -> HandlerContext {
    HandlerContext::new(
        GraphqlClient::new(base_url, &[ApiView::Public]),
        AccessToken::new("tok-flows"),
        state_root.to_path_buf(),
    )
}

fn template_info() -> serde_json::Value {
    json!({
        "id": "tmpl-1",
        "name": "Incident",
        "spaceStatus": {
            "acceptableValues": [
                {"id": "st-open", "displayName": "Open"},
                {"id": "st-done", "displayName": "Done"}
            ]
        },
        "properties": {
            "items": [
                {"id": "p-stage", "type": "LIST", "displayName": "Stage",
                 "acceptableValues": [{"id": "v-triage", "displayName": "Triage"}]},
                {"id": "p-owner", "type": "TEXT", "displayName": "Owner"}
            ]
        }
    })
}

fn template_response() -> String {
    json!({"data": {"spaceTemplate": template_info()}}).to_string()
}

fn annotations_response() -> String {
    json!({
        "data": {
            "message": {
                "id": "msg-9",
                "annotations": [
                    r#"{"type":"message-nlp-keywords","lens":"confirm"}"#,
                    r#"{"type":"message-focus","lens":"other"}"#,
                    r#"{"type":"message-focus","lens":"confirm","payload":"{\"ok\":true}"}"#
                ]
            }
        }
    })
    .to_string()
}

#[test]
fn action_filter_resolves_lens_through_referral_message() {
    let server = MockPlatformServer::start(1, |_| (200, annotations_response()));
    let dir = tempdir().expect("tempdir");
    let ctx = platform_ctx(&server.base_url, dir.path());

    let config = HandlerConfig::ActionFilter(ActionFilterConfig {
        actions: "approve, reject (confirm)".to_string(),
        referral_message_id: None,
    });
    let mut event = InboundEvent::new("evt-1", "triage", 1);
    event.action_id = Some("reject".to_string());
    event.referral_message_id = Some("msg-9".to_string());

    let outcome = dispatch(&ctx, "triage", &config, &event).expect("dispatch");
    assert_eq!(outcome.slots, 3);
    assert_eq!(outcome.outputs.len(), 1);
    assert_eq!(outcome.outputs[0].slot, 1);
    assert_eq!(outcome.outputs[0].payload["lens"], json!("confirm"));
    assert_eq!(outcome.outputs[0].payload["payload"], json!({"ok": true}));

    let requests = server.finish();
    assert_eq!(requests[0].auth_header, "Bearer tok-flows");
    let body = body_json(&requests[0]);
    assert_eq!(body["operationName"], json!("getAnnotations"));
    assert_eq!(body["variables"]["id"], json!("msg-9"));
}

#[test]
fn action_filter_errors_when_focus_lens_is_absent() {
    let server = MockPlatformServer::start(1, |_| {
        (
            200,
            json!({
                "data": {
                    "message": {
                        "id": "msg-9",
                        "annotations": [r#"{"type":"message-focus","lens":"other"}"#]
                    }
                }
            })
            .to_string(),
        )
    });
    let dir = tempdir().expect("tempdir");
    let ctx = platform_ctx(&server.base_url, dir.path());

    let config = HandlerConfig::ActionFilter(ActionFilterConfig {
        actions: "reject (confirm)".to_string(),
        referral_message_id: Some("msg-9".to_string()),
    });
    let mut event = InboundEvent::new("evt-1", "triage", 1);
    event.action_id = Some("reject".to_string());

    let err = dispatch(&ctx, "triage", &config, &event).expect_err("missing lens");
    assert!(matches!(err, HandlerError::LensNotFound { .. }));
    assert!(err.to_string().contains("confirm"));
    assert!(err.to_string().contains("msg-9"));
    let _ = server.finish();
}

#[test]
fn action_filter_prefers_configured_referral_message() {
    let server = MockPlatformServer::start(1, |_| (200, annotations_response()));
    let dir = tempdir().expect("tempdir");
    let ctx = platform_ctx(&server.base_url, dir.path());

    let config = HandlerConfig::ActionFilter(ActionFilterConfig {
        actions: "reject (confirm)".to_string(),
        referral_message_id: Some("msg-9".to_string()),
    });
    let mut event = InboundEvent::new("evt-1", "triage", 1);
    event.action_id = Some("reject".to_string());
    event.referral_message_id = Some("msg-from-event".to_string());

    dispatch(&ctx, "triage", &config, &event).expect("dispatch");

    let requests = server.finish();
    let body = body_json(&requests[0]);
    assert_eq!(body["variables"]["id"], json!("msg-9"));
}

#[test]
fn space_create_translates_display_forms_before_the_mutation() {
    let server = MockPlatformServer::start(2, |body| {
        if body.contains("getTemplate") {
            return (200, template_response());
        }
        (
            200,
            json!({
                "data": {
                    "createSpace": {
                        "space": {
                            "id": "space-9",
                            "title": "War room",
                            "propertyValueIds": [
                                {"propertyId": "p-stage", "propertyValueId": "v-triage"},
                                {"propertyId": "p-owner", "propertyValueId": "alice"}
                            ],
                            "statusValueId": "st-open"
                        }
                    }
                }
            })
            .to_string(),
        )
    });
    let dir = tempdir().expect("tempdir");
    let ctx = platform_ctx(&server.base_url, dir.path());

    let config = HandlerConfig::SpaceCreate(SpaceCreateConfig {
        template_id: Some("tmpl-1".to_string()),
        members: Some("p-1, p-2".to_string()),
        ..SpaceCreateConfig::default()
    });
    let mut event = InboundEvent::new("evt-2", "warroom", 1);
    event.title = Some("War room".to_string());
    event.status = Some("Open".to_string());
    event.properties = vec![
        PropertyValue {
            name: "Stage".to_string(),
            value: "Triage".to_string(),
        },
        PropertyValue {
            name: "Owner".to_string(),
            value: "alice".to_string(),
        },
    ];

    let outcome = dispatch(&ctx, "warroom", &config, &event).expect("dispatch");
    assert_eq!(outcome.slots, 1);
    let payload = &outcome.outputs[0].payload;
    assert_eq!(payload["space"]["id"], json!("space-9"));
    assert_eq!(payload["properties"][0]["valueDisplayName"], json!("Triage"));
    assert_eq!(payload["properties"][1]["valueDisplayName"], json!("alice"));
    assert_eq!(payload["status"], json!("Open"));

    let requests = server.finish();
    assert_eq!(requests.len(), 2);
    let input = &body_json(&requests[1])["variables"]["input"];
    assert_eq!(input["title"], json!("War room"));
    assert_eq!(input["templateId"], json!("tmpl-1"));
    assert_eq!(input["members"], json!(["p-1", "p-2"]));
    assert_eq!(input["statusValueId"], json!("st-open"));
    assert_eq!(
        input["propertyValues"],
        json!([
            {"propertyId": "p-stage", "propertyValueId": "v-triage"},
            {"propertyId": "p-owner", "propertyValueId": "alice"}
        ])
    );
}

#[test]
fn space_create_aborts_on_unknown_list_value_without_mutating() {
    let server = MockPlatformServer::start(1, |_| (200, template_response()));
    let dir = tempdir().expect("tempdir");
    let ctx = platform_ctx(&server.base_url, dir.path());

    let config = HandlerConfig::SpaceCreate(SpaceCreateConfig {
        template_id: Some("tmpl-1".to_string()),
        ..SpaceCreateConfig::default()
    });
    let mut event = InboundEvent::new("evt-3", "warroom", 1);
    event.title = Some("War room".to_string());
    event.properties = vec![PropertyValue {
        name: "Stage".to_string(),
        value: "Bogus".to_string(),
    }];

    let err = dispatch(&ctx, "warroom", &config, &event).expect_err("translation failure");
    assert!(matches!(err, HandlerError::Translation(_)));
    assert!(err.to_string().contains("Bogus"));
    assert!(err.to_string().contains("position 0"));

    let requests = server.finish();
    assert_eq!(requests.len(), 1, "the mutation must never run");
}

#[test]
fn space_update_runs_against_the_spaces_own_template() {
    let server = MockPlatformServer::start(2, |body| {
        if body.contains("getSpace") {
            return (
                200,
                json!({
                    "data": {
                        "space": {
                            "id": "space-1",
                            "title": "Ops",
                            "propertyValueIds": [
                                {"propertyId": "p-stage", "propertyValueId": "v-triage"}
                            ],
                            "statusValueId": "st-open",
                            "templateInfo": template_info()
                        }
                    }
                })
                .to_string(),
            );
        }
        (
            200,
            json!({
                "data": {
                    "updateSpace": {
                        "space": {
                            "id": "space-1",
                            "title": "Ops v2",
                            "propertyValueIds": [
                                {"propertyId": "p-stage", "propertyValueId": "v-triage"}
                            ],
                            "statusValueId": "st-done"
                        }
                    }
                }
            })
            .to_string(),
        )
    });
    let dir = tempdir().expect("tempdir");
    let ctx = platform_ctx(&server.base_url, dir.path());

    let config = HandlerConfig::SpaceUpdate(SpaceUpdateConfig { space_id: None });
    let mut event = InboundEvent::new("evt-4", "retitle", 1);
    event.space_id = Some("space-1".to_string());
    event.title = Some("Ops v2".to_string());
    event.status = Some("Done".to_string());
    event.add_members = vec!["p-3".to_string()];
    event.properties = vec![PropertyValue {
        name: "Stage".to_string(),
        value: "Triage".to_string(),
    }];

    let outcome = dispatch(&ctx, "retitle", &config, &event).expect("dispatch");
    let payload = &outcome.outputs[0].payload;
    assert_eq!(payload["space"]["title"], json!("Ops v2"));
    assert_eq!(payload["status"], json!("Done"));

    let requests = server.finish();
    let input = &body_json(&requests[1])["variables"]["input"];
    assert_eq!(input["id"], json!("space-1"));
    assert_eq!(input["title"], json!("Ops v2"));
    assert_eq!(input["statusValueId"], json!("st-done"));
    assert_eq!(input["addMembers"], json!(["p-3"]));
    assert_eq!(
        input["propertyValues"],
        json!([{"propertyId": "p-stage", "propertyValueId": "v-triage"}])
    );
}

#[test]
fn person_lookup_emits_successes_and_logs_failures() {
    let server = MockPlatformServer::start(2, |body| {
        if body.contains("p-ok") {
            return (
                200,
                json!({
                    "data": {
                        "person": {
                            "id": "p-ok",
                            "displayName": "Casey Okafor",
                            "email": "casey@example.com"
                        }
                    }
                })
                .to_string(),
            );
        }
        (200, r#"{"data":{"person":null}}"#.to_string())
    });
    let dir = tempdir().expect("tempdir");
    let ctx = platform_ctx(&server.base_url, dir.path());

    let config = HandlerConfig::PersonLookup(PersonLookupConfig {
        people: Some("p-ok, p-missing".to_string()),
        lookup_by: LookupKey::Id,
    });
    let event = InboundEvent::new("evt-5", "who", 1);

    let outcome = dispatch(&ctx, "who", &config, &event).expect("dispatch");
    let people = &outcome.outputs[0].payload["people"];
    assert_eq!(people.as_array().expect("people array").len(), 1);
    assert_eq!(people[0]["id"], json!("p-ok"));
    assert_eq!(people[0]["displayName"], json!("Casey Okafor"));

    let log = fs::read_to_string(dir.path().join("logs/flow.log")).expect("flow log");
    assert!(log.contains("p-missing"));
    assert!(log.contains("failed"));
    let _ = server.finish();
}

#[test]
fn graphql_passthrough_republishes_data_with_view_override() {
    let server = MockPlatformServer::start(1, |_| {
        (200, r#"{"data":{"widgets":[1,2]}}"#.to_string())
    });
    let dir = tempdir().expect("tempdir");
    let ctx = platform_ctx(&server.base_url, dir.path());

    let config = HandlerConfig::Graphql(GraphqlPassthroughConfig {
        query: None,
        operation_name: None,
        views: Some(vec![ApiView::Experimental]),
    });
    let mut event = InboundEvent::new("evt-6", "raw", 1);
    event.query = Some("query { widgets }".to_string());
    event.variables = Some(json!({"first": 2}));

    let outcome = dispatch(&ctx, "raw", &config, &event).expect("dispatch");
    assert_eq!(outcome.outputs[0].payload, json!({"widgets": [1, 2]}));

    let requests = server.finish();
    assert_eq!(requests[0].view_header, "EXPERIMENTAL");
    let body = body_json(&requests[0]);
    assert_eq!(body["query"], json!("query { widgets }"));
    assert_eq!(body["variables"]["first"], json!(2));
}

#[test]
fn drain_carries_a_claimed_event_through_the_platform_api() {
    let server = MockPlatformServer::start(1, |_| {
        (
            200,
            json!({
                "data": {
                    "createMessage": {
                        "message": {"id": "m-1", "created": "2024-05-01T00:00:00Z"}
                    }
                }
            })
            .to_string(),
        )
    });

    let dir = tempdir().expect("tempdir");
    let state_root = dir.path().join(".spaceflow");
    bootstrap_state_root(&StatePaths::new(&state_root)).expect("bootstrap");

    let settings = serde_yaml::from_str(&format!(
        r#"
platform:
  host: {}
handlers:
  announce:
    kind: message_post
    space_id: space-1
    actor: deploybot
"#,
        server.base_url
    ))
    .expect("parse settings");

    let mut event = InboundEvent::new("evt-9", "announce", 5);
    event.text = Some("release done".to_string());
    fs::write(
        state_root.join("queue/incoming/evt-9.json"),
        serde_json::to_string(&event).expect("encode event"),
    )
    .expect("write incoming");

    let gate = TokenGate::new();
    gate.install(AccessToken::new("tok-drain"));
    let drained = drain_queue_once(&state_root, &settings, &gate).expect("drain");
    assert_eq!(drained, 1);

    let outgoing = state_root.join("queue/outgoing/announce_evt-9_s0.json");
    let raw = fs::read_to_string(&outgoing).expect("outgoing file");
    let output: OutboundEvent = serde_json::from_str(&raw).expect("decode outgoing");
    assert_eq!(output.slot, 0);
    assert_eq!(output.slots, 1);
    assert_eq!(output.payload["message"]["id"], json!("m-1"));

    let requests = server.finish();
    assert_eq!(requests[0].path, "/graphql");
    assert_eq!(requests[0].auth_header, "Bearer tok-drain");
    let body = body_json(&requests[0]);
    assert_eq!(body["operationName"], json!("createMessage"));
    let input = &body["variables"]["input"];
    assert_eq!(input["conversationId"], json!("space-1"));
    assert_eq!(
        input["annotations"][0]["genericAnnotation"]["text"],
        json!("release done")
    );
    assert_eq!(
        input["annotations"][0]["genericAnnotation"]["actor"]["name"],
        json!("deploybot")
    );
}
