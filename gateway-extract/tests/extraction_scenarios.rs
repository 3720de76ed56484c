use gateway_extract::{run_extraction, Schema};
use serde_json::json;

fn invoice_schema() -> Schema {
    Schema::compile(
        "invoice",
        json!({
            "type": "object",
            "properties": {
                "invoice_number": {"type": "string"},
                "total": {"type": "number"},
            },
            "required": ["invoice_number", "total"],
            "additionalProperties": false,
        }),
    )
    .unwrap()
}

#[tokio::test]
async fn prose_with_two_candidates_validates_the_second() {
    let schema = invoice_schema();
    let raw = "Sure thing! Here's a draft: {\"invoice_number\": \"A-1\"} but that's missing the \
               total, so here's the real one: {\"invoice_number\": \"A-1\", \"total\": 42.5}";

    let (result, stats) = run_extraction(&schema, "irrelevant source text", raw, true, |_| async move {
        unreachable!("backend should not be called when the first pass validates")
    })
    .await;

    assert_eq!(result.unwrap(), json!({"invoice_number": "A-1", "total": 42.5}));
    assert!(!stats.repair_attempted);
}

#[tokio::test]
async fn delimited_output_wrapped_in_code_fence_is_accepted() {
    let schema = invoice_schema();
    let raw = "<<<JSON>>>\n```json\n{\"invoice_number\": \"B-7\", \"total\": 9}\n```\n<<<END>>>";

    let (result, _stats) = run_extraction(&schema, "src", raw, true, |_| async move {
        unreachable!()
    })
    .await;

    assert_eq!(result.unwrap(), json!({"invoice_number": "B-7", "total": 9}));
}

#[tokio::test]
async fn malformed_first_pass_is_repaired_once_and_succeeds() {
    let schema = invoice_schema();
    let raw = "I cannot produce JSON for that.";

    let (result, stats) = run_extraction(&schema, "src", raw, true, |prompt| async move {
        assert!(prompt.contains("Previous output"));
        Ok("{\"invoice_number\": \"C-3\", \"total\": 11}".to_string())
    })
    .await;

    assert_eq!(result.unwrap(), json!({"invoice_number": "C-3", "total": 11}));
    assert!(stats.repair_attempted);
}

#[tokio::test]
async fn extra_property_fails_schema_and_is_not_silently_accepted() {
    let schema = invoice_schema();
    let raw = "{\"invoice_number\": \"D-9\", \"total\": 5, \"currency\": \"usd\"}";

    let (result, stats) = run_extraction(&schema, "src", raw, false, |_| async move {
        unreachable!("repair disabled")
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.code(), "schema_validation_failed");
    assert!(!stats.repair_attempted);
}
