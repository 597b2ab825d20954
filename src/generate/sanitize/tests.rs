use super::*;
use serde_json::Value;

#[test]
fn strips_json_fences() {
    let raw = "```json\n[{\"a\": 1}]\n```";
    assert_eq!(clean_json_output(raw), r#"[{"a": 1}]"#);
}

#[test]
fn strips_bare_fences() {
    let raw = "```\n[1, 2]\n```";
    assert_eq!(clean_json_output(raw), "[1, 2]");
}

#[test]
fn extracts_array_from_surrounding_prose() {
    let raw = "Hier ist dein Quiz:\n[{\"a\": 1}]\nViel Erfolg!";
    assert_eq!(clean_json_output(raw), r#"[{"a": 1}]"#);
}

#[test]
fn inserts_missing_comma_between_objects() {
    let raw = r#"[{"q": "eins"} {"q": "zwei"}]"#;
    let cleaned = clean_json_output(raw);

    let parsed: Vec<Value> = serde_json::from_str(&cleaned).expect("repaired JSON parses");
    assert_eq!(parsed.len(), 2);
}

#[test]
fn strips_comment_lines() {
    let raw = "[\n// day one\n{\"a\": 1},\n  // day two\n{\"a\": 2}\n]";
    let parsed: Vec<Value> =
        serde_json::from_str(&clean_json_output(raw)).expect("comment-free JSON parses");
    assert_eq!(parsed.len(), 2);
}

#[test]
fn urls_in_strings_survive_comment_stripping() {
    let raw = r#"[{"link": "https://example.com/page"}]"#;
    let cleaned = clean_json_output(raw);
    assert!(cleaned.contains("https://example.com/page"));
}

#[test]
fn fenced_output_with_missing_comma_round_trips() {
    // The canonical repair case: fenced output and a dropped comma.
    let raw = "```json\n[{\"question\": \"F1\", \"answer\": \"A\"}\n{\"question\": \"F2\", \"answer\": \"B\"}]\n```";

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Q {
        question: String,
        answer: String,
    }

    let parsed: Vec<Q> = parse_model_array(raw).expect("sanitized output parses");
    assert_eq!(
        parsed,
        vec![
            Q {
                question: "F1".to_string(),
                answer: "A".to_string()
            },
            Q {
                question: "F2".to_string(),
                answer: "B".to_string()
            },
        ]
    );
}

#[test]
fn permissive_parse_tolerates_single_quotes() {
    let raw = "[{'title': 'Thermodynamik', 'time_minutes': 45}]";

    let parsed: Vec<Value> = parse_model_array(raw).expect("permissive parse succeeds");
    assert_eq!(parsed[0]["title"], "Thermodynamik");
    assert_eq!(parsed[0]["time_minutes"], 45);
}

#[test]
fn single_quote_relaxation_preserves_double_quoted_strings() {
    let relaxed = relax_single_quotes(r#"[{"a": "it's fine", 'b': 'two'}]"#);
    let parsed: Vec<Value> = serde_json::from_str(&relaxed).expect("mixed quoting parses");
    assert_eq!(parsed[0]["a"], "it's fine");
    assert_eq!(parsed[0]["b"], "two");
}

#[test]
fn embedded_double_quotes_are_escaped() {
    let relaxed = relax_single_quotes(r#"[{'a': 'ein "Zitat" hier'}]"#);
    let parsed: Vec<Value> = serde_json::from_str(&relaxed).expect("escaped quoting parses");
    assert_eq!(parsed[0]["a"], r#"ein "Zitat" hier"#);
}

#[test]
fn escaped_single_quote_inside_single_quotes() {
    let relaxed = relax_single_quotes(r"['it\'s']");
    let parsed: Vec<Value> = serde_json::from_str(&relaxed).expect("escape resolves");
    assert_eq!(parsed[0], "it's");
}

#[test]
fn unparseable_output_preserves_raw_text() {
    let raw = "Das Modell hat heute keine Lust auf JSON.";

    let result: crate::Result<Vec<Value>> = parse_model_array(raw);

    match result {
        Err(StudyError::MalformedOutput { raw: kept }) => assert_eq!(kept, raw),
        other => panic!("expected MalformedOutput, got {other:?}"),
    }
}

#[test]
fn clean_is_a_no_op_on_valid_arrays() {
    let raw = r#"[{"date": "01.09.2026", "title": "Grundlagen"}]"#;
    assert_eq!(clean_json_output(raw), raw);
}
