use serde_json::json;
use shared::{
    domain::RecordId,
    protocol::{ACTION_RESULT_TAG, QUERY_RESULT_TAG, RECORD_TAG},
};

use super::*;
use crate::{
    model::{default_registry, ActionResult, DialogRedirection, Record, RecordSet},
    registry::NoFactory,
    wire::wire_object,
};

#[derive(Debug, Default, PartialEq)]
struct Foo {
    id: i64,
    labels: Vec<String>,
}

wire_object!(Foo {
    "_id" => id: scalar,
    "labels" => labels: scalar,
});

#[derive(Debug, Default, PartialEq)]
struct Bar {
    id: i64,
}

wire_object!(Bar {
    "id" => id: scalar,
});

fn decoder() -> Decoder {
    let mut registry = default_registry();
    registry.register::<Foo>("Foo").register::<Bar>("Bar");
    Decoder::new(registry)
}

fn dialog_redirection() -> Value {
    json!({
        "WS_OTYPE": "WSDialogRedirection",
        "dialogHandle": "dlg-7",
        "dialogType": "FormDialog",
        "objectId": "rec-1",
        "open": true
    })
}

#[test]
fn decodes_registered_type_for_matching_tag() {
    let decoder = decoder();
    let raw = json!({ "type": "Foo", "id": 4, "labels": ["x"] });

    let foo: Foo = decoder
        .extract_value(Some(&raw), "Foo", &NoFactory)
        .expect("foo");
    assert_eq!(
        foo,
        Foo {
            id: 4,
            labels: vec!["x".to_string()],
        }
    );
}

#[test]
fn different_expected_tag_is_a_mismatch() {
    let decoder = decoder();
    let raw = json!({ "WS_OTYPE": "WSRecord", "id": "r1" });

    let err = decoder
        .extract_value::<Record>(Some(&raw), "WSProp", &NoFactory)
        .expect_err("mismatch");
    match err {
        DecodeError::TypeMismatch { expected, found } => {
            assert_eq!(expected, "WSProp");
            assert_eq!(found.as_deref(), Some(RECORD_TAG));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn untagged_and_scalar_payloads_are_mismatches() {
    let decoder = decoder();
    for raw in [json!({ "id": 1 }), json!("Foo"), json!(12)] {
        let err = decoder
            .extract_value::<Foo>(Some(&raw), "Foo", &NoFactory)
            .expect_err("no tag");
        assert!(matches!(err, DecodeError::TypeMismatch { found: None, .. }));
    }
}

#[test]
fn null_payload_is_null_input() {
    let decoder = decoder();
    for raw in [None, Some(&Value::Null)] {
        let err = decoder
            .extract_value::<Foo>(raw, "Foo", &NoFactory)
            .expect_err("null");
        assert!(matches!(err, DecodeError::NullInput { expected } if expected == "Foo"));
    }
}

#[test]
fn redirection_wins_over_value_fields() {
    let decoder = decoder();
    let raw = json!({
        "WS_OTYPE": "WSQueryResult",
        "records": { "WS_LTYPE": "WSRecord", "values": [{ "WS_OTYPE": "WSRecord", "id": "r1" }] },
        "hasMore": true,
        "redirection": dialog_redirection()
    });

    let outcome = decoder
        .decode_value::<RecordSet>(Some(&raw), QUERY_RESULT_TAG, decoder.registry(), false)
        .expect("redirection");
    let Either::Left(Redirection::Dialog(redirection)) = outcome else {
        panic!("expected a dialog redirection");
    };
    assert_eq!(redirection.dialog_handle.as_str(), "dlg-7");
    assert_eq!(redirection.object_id, Some(RecordId::from("rec-1")));
    assert!(redirection.open);
}

#[test]
fn ignored_redirection_decodes_the_value() {
    let decoder = decoder();
    let raw = json!({
        "WS_OTYPE": "WSQueryResult",
        "records": { "WS_LTYPE": "WSRecord", "values": [{ "WS_OTYPE": "WSRecord", "id": "r1" }] },
        "hasMore": true,
        "redirection": dialog_redirection()
    });

    let outcome = decoder
        .decode_value::<RecordSet>(Some(&raw), QUERY_RESULT_TAG, decoder.registry(), true)
        .expect("value");
    let set = outcome.right().expect("right");
    assert!(set.has_more);
    assert_eq!(set.records, vec![Record::new("r1")]);
}

#[test]
fn action_result_keeps_redirection_slot_when_ignored() {
    let decoder = decoder();
    let raw = json!({
        "WS_OTYPE": "WSActionResult",
        "message": "saved",
        "redirection": dialog_redirection()
    });

    let result = decoder
        .decode_value::<ActionResult>(Some(&raw), ACTION_RESULT_TAG, decoder.registry(), true)
        .expect("value")
        .right()
        .expect("right");
    assert_eq!(result.message.as_deref(), Some("saved"));
    assert!(matches!(
        result.redirection,
        Some(Redirection::Dialog(DialogRedirection { ref dialog_type, .. })) if dialog_type == "FormDialog"
    ));
}

#[test]
fn extract_value_rejects_redirections() {
    let decoder = decoder();
    let raw = json!({ "WS_OTYPE": "WSActionResult", "redirection": { "WS_OTYPE": "WSNullRedirection" } });

    let err = decoder
        .extract_value::<ActionResult>(Some(&raw), ACTION_RESULT_TAG, decoder.registry())
        .expect_err("redirection");
    assert!(matches!(err, DecodeError::UnexpectedRedirection(redirection) if *redirection == Redirection::Null));

    let passed_through = decoder
        .extract_value_or_redirect::<ActionResult>(Some(&raw), ACTION_RESULT_TAG, decoder.registry())
        .expect("either");
    assert_eq!(passed_through, Either::Left(Redirection::Null));
}

#[test]
fn exception_wins_over_redirection_and_value() {
    let decoder = decoder();
    let raw = json!({
        "WS_OTYPE": "WSQueryResult",
        "hasMore": false,
        "redirection": dialog_redirection(),
        "exception": {
            "WS_OTYPE": "WSException",
            "name": "QueryError",
            "message": "query failed",
            "cause": { "WS_OTYPE": "WSException", "message": "table missing" }
        }
    });

    for ignore_redirection in [false, true] {
        let err = decoder
            .decode_value::<RecordSet>(Some(&raw), QUERY_RESULT_TAG, decoder.registry(), ignore_redirection)
            .expect_err("exception");
        let DecodeError::ServerException(exception) = err else {
            panic!("expected a server exception");
        };
        assert_eq!(exception.message, "query failed");
        assert_eq!(exception.name.as_deref(), Some("QueryError"));
        assert_eq!(
            exception.cause.as_ref().map(|cause| cause.message.as_str()),
            Some("table missing")
        );
        assert!(exception.raw.is_none());
    }
}

#[test]
fn undecodable_exception_falls_back_to_raw_text() {
    let decoder = decoder();
    let raw = json!({ "WS_OTYPE": "Foo", "exception": "disk on fire" });

    let err = decoder
        .extract_value::<Foo>(Some(&raw), "Foo", &NoFactory)
        .expect_err("exception");
    let DecodeError::ServerException(exception) = err else {
        panic!("expected a server exception");
    };
    assert_eq!(exception.raw.as_deref(), Some("\"disk on fire\""));
}

#[test]
fn list_fails_fast_at_the_first_bad_element() {
    let decoder = decoder();
    let raw = json!({
        "WS_LTYPE": "Foo",
        "values": [
            { "type": "Foo", "id": 1 },
            { "type": "Bar", "id": 2 },
            null
        ]
    });

    let err = decoder
        .extract_list::<Foo>(Some(&raw), "Foo", &NoFactory)
        .expect_err("element 1 is a Bar");
    match err {
        DecodeError::TypeMismatch { expected, found } => {
            assert_eq!(expected, "Foo");
            assert_eq!(found.as_deref(), Some("Bar"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn bare_arrays_need_a_list_tag() {
    let decoder = decoder();
    let raw = json!([{ "type": "Foo", "id": 1 }, { "type": "Foo", "id": 2 }]);

    let err = decoder
        .extract_list::<Foo>(Some(&raw), "Foo", &NoFactory)
        .expect_err("plain tag");
    assert!(matches!(err, DecodeError::ListTypeExpected { expected } if expected == "Foo"));

    let foos = decoder
        .extract_list::<Foo>(Some(&raw), "List<Foo>", &NoFactory)
        .expect("list");
    assert_eq!(foos.iter().map(|foo| foo.id).collect::<Vec<_>>(), [1, 2]);
}

#[test]
fn list_envelope_element_type_must_match_list_tag() {
    let decoder = decoder();
    let raw = json!({ "WS_LTYPE": "Foo", "values": [] });

    let err = decoder
        .extract_list::<Bar>(Some(&raw), "List<Bar>", &NoFactory)
        .expect_err("Foo list is not a Bar list");
    assert!(matches!(err, DecodeError::TypeMismatch { found: Some(found), .. } if found == "List<Foo>"));

    let empty = decoder
        .extract_list::<Foo>(Some(&raw), "List<Foo>", &NoFactory)
        .expect("empty list");
    assert!(empty.is_empty());
}

#[test]
fn element_exception_fails_the_list() {
    let decoder = decoder();
    let elements = json!([
        { "type": "Foo", "id": 1 },
        {
            "type": "Foo",
            "id": 2,
            "exception": { "WS_OTYPE": "WSException", "message": "row 2 failed" }
        }
    ]);
    let envelope = json!({ "WS_LTYPE": "Foo", "values": elements.clone() });

    for (raw, expected) in [(&elements, "List<Foo>"), (&envelope, "List<Foo>"), (&envelope, "Foo")] {
        for ignore_redirection in [false, true] {
            let err = decoder
                .decode_list::<Foo>(Some(raw), expected, &NoFactory, ignore_redirection)
                .expect_err("element exception");
            let DecodeError::ServerException(exception) = err else {
                panic!("expected a server exception");
            };
            assert_eq!(exception.message, "row 2 failed");
        }
    }
}

#[test]
fn element_redirection_is_unexpected_unless_ignored() {
    let decoder = decoder();
    let raw = json!({
        "WS_LTYPE": "Foo",
        "values": [
            { "type": "Foo", "id": 1, "redirection": { "WS_OTYPE": "WSNullRedirection" } },
            { "type": "Foo", "id": 2 }
        ]
    });

    let err = decoder
        .decode_list::<Foo>(Some(&raw), "List<Foo>", &NoFactory, false)
        .expect_err("redirecting element");
    assert!(matches!(err, DecodeError::UnexpectedRedirection(redirection) if *redirection == Redirection::Null));

    let foos = decoder
        .decode_list::<Foo>(Some(&raw), "List<Foo>", &NoFactory, true)
        .expect("ignored")
        .right()
        .expect("right");
    assert_eq!(foos.iter().map(|foo| foo.id).collect::<Vec<_>>(), [1, 2]);
}

#[test]
fn list_envelope_exception_and_redirection_are_checked_before_values() {
    let decoder = decoder();
    let failed = json!({
        "WS_LTYPE": "Foo",
        "values": [{ "type": "Foo", "id": 1 }],
        "exception": { "WS_OTYPE": "WSException", "message": "list failed" }
    });

    let err = decoder
        .extract_list::<Foo>(Some(&failed), "List<Foo>", &NoFactory)
        .expect_err("envelope exception");
    assert!(matches!(err, DecodeError::ServerException(ref exception) if exception.message == "list failed"));

    let redirected = json!({
        "WS_LTYPE": "Foo",
        "values": [{ "type": "Foo", "id": 1 }],
        "redirection": dialog_redirection()
    });
    let outcome = decoder
        .decode_list::<Foo>(Some(&redirected), "List<Foo>", &NoFactory, false)
        .expect("redirection");
    assert!(matches!(outcome, Either::Left(Redirection::Dialog(_))));

    let foos = decoder
        .decode_list::<Foo>(Some(&redirected), "List<Foo>", &NoFactory, true)
        .expect("ignored")
        .right()
        .expect("right");
    assert_eq!(foos.len(), 1);
}

#[test]
fn nested_record_lists_skip_element_checks() {
    let decoder = decoder();
    let raw = json!({
        "WS_OTYPE": "WSQueryResult",
        "records": {
            "WS_LTYPE": "WSRecord",
            "values": [{ "WS_OTYPE": "WSRecord", "id": "r1", "redirection": { "WS_OTYPE": "WSNullRedirection" } }]
        },
        "hasMore": false
    });

    let set: RecordSet = decoder
        .extract_value(Some(&raw), QUERY_RESULT_TAG, decoder.registry())
        .expect("nested redirection is not an envelope");
    assert_eq!(set.records.len(), 1);
}

#[test]
fn unknown_fields_are_skipped_and_scalar_lists_copied() {
    let decoder = decoder();
    let raw = json!({
        "type": "Foo",
        "id": 9,
        "color": "teal",
        "labels": { "WS_LTYPE": "String", "values": ["a", "b"] }
    });

    let foo: Foo = decoder
        .extract_value(Some(&raw), "Foo", &NoFactory)
        .expect("foo");
    assert_eq!(foo.id, 9);
    assert_eq!(foo.labels, ["a", "b"]);
}

#[test]
fn wrong_field_shape_fails_the_decode() {
    let decoder = decoder();
    let raw = json!({ "WS_OTYPE": "WSQueryResult", "hasMore": "sometimes" });

    let err = decoder
        .extract_value::<RecordSet>(Some(&raw), QUERY_RESULT_TAG, &NoFactory)
        .expect_err("bad bool");
    assert!(matches!(err, DecodeError::InvalidField { field, .. } if field == "hasMore"));
}

struct ScaledFoo;

impl ObjectFactory for ScaledFoo {
    fn create(&self, ctx: &FactoryContext<'_>) -> Option<Result<Box<dyn WireObject>, DecodeError>> {
        if ctx.tag != "Foo" {
            return None;
        }
        Some(ctx.fields::<Foo>("Foo").map(|mut foo| {
            foo.id *= 10;
            Box::new(foo) as Box<dyn WireObject>
        }))
    }
}

struct RefusingFactory;

impl ObjectFactory for RefusingFactory {
    fn create(&self, ctx: &FactoryContext<'_>) -> Option<Result<Box<dyn WireObject>, DecodeError>> {
        Some(Err(DecodeError::factory(ctx.tag, "refused")))
    }
}

struct PanickingFactory;

impl ObjectFactory for PanickingFactory {
    fn create(&self, _ctx: &FactoryContext<'_>) -> Option<Result<Box<dyn WireObject>, DecodeError>> {
        panic!("factory exploded")
    }
}

#[test]
fn custom_factory_takes_precedence_over_field_copy() {
    let decoder = decoder();
    let raw = json!({ "type": "Foo", "id": 3 });

    let foo: Foo = decoder
        .extract_value(Some(&raw), "Foo", &ScaledFoo)
        .expect("scaled");
    assert_eq!(foo.id, 30);

    let bar: Bar = decoder
        .extract_value(Some(&json!({ "type": "Bar", "id": 3 })), "Bar", &ScaledFoo)
        .expect("generic path for other tags");
    assert_eq!(bar.id, 3);
}

#[test]
fn factory_failures_are_the_outcome() {
    let decoder = decoder();
    let raw = json!({ "type": "Foo", "id": 3 });

    let err = decoder
        .extract_value::<Foo>(Some(&raw), "Foo", &RefusingFactory)
        .expect_err("refused");
    assert!(matches!(err, DecodeError::FactoryFailure { message, .. } if message == "refused"));

    let err = decoder
        .extract_value::<Foo>(Some(&raw), "Foo", &PanickingFactory)
        .expect_err("panic");
    assert!(matches!(err, DecodeError::FactoryFailure { message, .. } if message == "factory exploded"));
}

#[test]
fn unregistered_tag_without_factory_fails() {
    let decoder = decoder();
    let raw = json!({ "type": "Baz" });

    let err = decoder
        .extract_value::<Foo>(Some(&raw), "Baz", &NoFactory)
        .expect_err("no constructor");
    assert!(matches!(err, DecodeError::FactoryFailure { tag, .. } if tag == "Baz"));
}
