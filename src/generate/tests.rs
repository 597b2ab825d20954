use std::cell::RefCell;

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::*;

struct MockGenerator {
    response: String,
    prompts: RefCell<Vec<String>>,
}

impl MockGenerator {
    fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            prompts: RefCell::new(Vec::new()),
        }
    }

    fn last_prompt(&self) -> String {
        self.prompts.borrow().last().cloned().expect("a prompt was sent")
    }
}

impl TextGenerator for MockGenerator {
    fn generate(&self, prompt: &str) -> crate::Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self.response.clone())
    }
}

struct FailingGenerator;

impl TextGenerator for FailingGenerator {
    fn generate(&self, _prompt: &str) -> crate::Result<String> {
        Err(StudyError::Generation("quota exhausted".to_string()))
    }
}

fn chunk(text: &str, page: usize) -> Chunk {
    Chunk {
        text: text.to_string(),
        page,
        source: "skript.pdf".to_string(),
    }
}

fn chunks(n: usize) -> Vec<Chunk> {
    (0..n).map(|i| chunk(&format!("Inhalt {i}"), i + 1)).collect()
}

const QUIZ_JSON: &str = r#"```json
[
    {"question": "F1?", "options": ["A", "B", "C", "D"], "answer": "A"}
    {"question": "F2?", "options": ["A", "B", "C", "D"], "answer": "C"}
]
```"#;

#[test]
fn quiz_parses_sanitized_model_output() {
    let generator = MockGenerator::new(QUIZ_JSON);
    let mut rng = StdRng::seed_from_u64(7);

    let quiz = generate_quiz_with_rng(&chunks(10), &generator, &mut rng)
        .expect("fenced output with missing comma is repaired");

    assert_eq!(quiz.len(), 2);
    assert_eq!(quiz[0].question, "F1?");
    assert_eq!(quiz[1].answer, "C");
    assert_eq!(quiz[0].options.len(), 4);
}

#[test]
fn quiz_samples_three_chunks_with_page_citations() {
    let generator = MockGenerator::new("[]");
    let mut rng = StdRng::seed_from_u64(7);

    generate_quiz_with_rng(&chunks(10), &generator, &mut rng).expect("empty array parses");

    let prompt = generator.last_prompt();
    assert_eq!(prompt.matches("[Seite ").count(), QUIZ_SAMPLE_SIZE);
    assert!(prompt.contains("Multiple-Choice-Fragen"));
}

#[test]
fn quiz_with_fewer_chunks_uses_them_all() {
    let generator = MockGenerator::new("[]");
    let mut rng = StdRng::seed_from_u64(7);

    generate_quiz_with_rng(&chunks(2), &generator, &mut rng).expect("empty array parses");

    assert_eq!(generator.last_prompt().matches("[Seite ").count(), 2);
}

#[test]
fn quiz_requires_chunks() {
    let generator = MockGenerator::new("[]");
    let result = generate_quiz(&[], &generator);
    assert!(matches!(result, Err(StudyError::Generation(_))));
}

#[test]
fn quiz_generation_failure_propagates() {
    let result = generate_quiz(&chunks(5), &FailingGenerator);
    assert!(matches!(result, Err(StudyError::Generation(_))));
}

#[test]
fn plan_sampling_takes_everything_when_small() {
    let collection = chunks(30);
    let sample = sample_for_plan(&collection);
    assert_eq!(sample.len(), 30);
}

#[test]
fn plan_sampling_strides_large_collections() {
    let collection = chunks(100);

    let sample = sample_for_plan(&collection);

    // 100 chunks stride by 3: positions 0, 3, 6, ...
    assert_eq!(sample.len(), 34);
    assert_eq!(sample[0].text, "Inhalt 0");
    assert_eq!(sample[1].text, "Inhalt 3");
    assert!(sample.last().expect("non-empty").text == "Inhalt 99");
}

fn plan_request() -> PlanRequest {
    PlanRequest {
        dates: vec![
            NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date"),
            NaiveDate::from_ymd_opt(2026, 9, 3).expect("valid date"),
        ],
        kind: MaterialKind::Exam,
        focus: Some("Integralrechnung".to_string()),
        summary: None,
    }
}

const PLAN_JSON: &str = r#"[
    {
        "date": "01.09.2026",
        "day_number": 1,
        "title": "Grundlagen",
        "objectives": ["Begriffe kennen"],
        "topics": [
            {"title": "Integrale", "time_minutes": 45, "description": "Lies Kapitel 1.",
             "links": ["[📄 S. 3](#page=3)"], "rationale": "Basis für alles Weitere."}
        ],
        "review_focus": "Definitionen"
    },
    {
        "date": "03.09.2026",
        "title": "Vertiefung",
        "topics": []
    }
]"#;

#[test]
fn plan_parses_day_schema() {
    let generator = MockGenerator::new(PLAN_JSON);

    let plan = generate_plan(&chunks(5), &plan_request(), &generator)
        .expect("well-formed plan parses");

    assert_eq!(plan.len(), 2);
    assert_eq!(plan[0].date, "01.09.2026");
    assert_eq!(plan[0].day_number, Some(1));
    assert_eq!(plan[0].topics[0].time_minutes, 45);
    // Optional fields default instead of failing the parse.
    assert_eq!(plan[1].day_number, None);
    assert!(plan[1].objectives.is_empty());
    assert_eq!(plan[1].review_focus, None);
}

#[test]
fn plan_prompt_carries_dates_goal_and_focus() {
    let generator = MockGenerator::new(PLAN_JSON);

    generate_plan(&chunks(5), &plan_request(), &generator).expect("plan parses");

    let prompt = generator.last_prompt();
    assert!(prompt.contains("01.09.2026, 03.09.2026"));
    assert!(prompt.contains("Zeitraum: 2 Tage"));
    assert!(prompt.contains("PRÜFUNG/KLAUSUR"));
    assert!(prompt.contains("Fokus-Thema des Nutzers: Integralrechnung"));
    assert!(prompt.contains("=== SOURCE_START [Seite 1] ==="));
}

#[test]
fn plan_context_truncates_long_chunks() {
    let generator = MockGenerator::new(PLAN_JSON);
    let long_chunk = vec![chunk(&"x".repeat(5000), 1)];

    generate_plan(&long_chunk, &plan_request(), &generator).expect("plan parses");

    let prompt = generator.last_prompt();
    let body: String = prompt
        .split("=== SOURCE_START [Seite 1] ===")
        .nth(1)
        .expect("context marker present")
        .split("=== SOURCE_END ===")
        .next()
        .expect("end marker present")
        .to_string();
    assert_eq!(body.matches('x').count(), 2000);
}

#[test]
fn plan_requires_dates_and_chunks() {
    let generator = MockGenerator::new(PLAN_JSON);

    let mut no_dates = plan_request();
    no_dates.dates.clear();
    assert!(generate_plan(&chunks(5), &no_dates, &generator).is_err());

    assert!(generate_plan(&[], &plan_request(), &generator).is_err());
}

#[test]
fn malformed_plan_output_surfaces_raw_text() {
    let generator = MockGenerator::new("Kein JSON, nur Prosa.");

    let result = generate_plan(&chunks(5), &plan_request(), &generator);

    match result {
        Err(StudyError::MalformedOutput { raw }) => {
            assert_eq!(raw, "Kein JSON, nur Prosa.");
        }
        other => panic!("expected MalformedOutput, got {other:?}"),
    }
}

#[test]
fn summary_prompt_carries_language_focus_and_source() {
    let generator = MockGenerator::new("# Zusammenfassung\n...");

    let summary = generate_summary(&chunks(3), "Englisch", Some("Ableitungen"), &generator)
        .expect("generation succeeds");

    assert!(summary.starts_with("# Zusammenfassung"));
    let prompt = generator.last_prompt();
    assert!(prompt.contains("**Sprache**: Englisch"));
    assert!(prompt.contains("Ableitungen"));
    assert!(prompt.contains("skript.pdf"));
}

#[test]
fn summary_input_is_capped() {
    let generator = MockGenerator::new("ok");
    let big: Vec<Chunk> = (0..100).map(|i| chunk(&"y".repeat(1000), i + 1)).collect();

    generate_summary(&big, "Deutsch", None, &generator).expect("generation succeeds");

    // 100k chars of input are cut to 50k; the joining newlines count towards
    // the cap, so 49 full 1001-char blocks plus 951 chars survive.
    let prompt = generator.last_prompt();
    assert_eq!(prompt.matches('y').count(), 49_951);
}

#[test]
fn topic_summary_prefers_keyword_matches() {
    let generator = MockGenerator::new("Flashcard");
    let collection = vec![
        chunk("Einleitung ohne Treffer", 1),
        chunk("Die Fourier-Transformation zerlegt Signale", 2),
        chunk("Noch ein Kapitel", 3),
    ];

    generate_topic_summary("Fourier Transformation", &collection, &generator)
        .expect("generation succeeds");

    let prompt = generator.last_prompt();
    assert!(prompt.contains("Fourier-Transformation zerlegt"));
    assert!(!prompt.contains("Einleitung ohne Treffer"));
}

#[test]
fn topic_summary_falls_back_to_document_opening() {
    let generator = MockGenerator::new("Flashcard");
    let collection = chunks(5);

    generate_topic_summary("Quantenfeldtheorie", &collection, &generator)
        .expect("generation succeeds");

    let prompt = generator.last_prompt();
    assert!(prompt.contains("Inhalt 0"));
    assert!(prompt.contains("Inhalt 2"));
    assert!(!prompt.contains("Inhalt 3"));
}
