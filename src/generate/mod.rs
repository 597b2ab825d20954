pub mod sanitize;

#[cfg(test)]
mod tests;

use chrono::NaiveDate;
use itertools::Itertools;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunking::Chunk;
use crate::embeddings::TextGenerator;
use crate::{Result, StudyError};

pub use sanitize::{clean_json_output, parse_model_array};

/// Chunks drawn at random for one quiz round.
pub const QUIZ_SAMPLE_SIZE: usize = 3;
/// Above this many chunks, plan context switches from "take everything" to
/// evenly-strided sampling across the whole collection.
pub const PLAN_SAMPLE_LIMIT: usize = 30;

const PLAN_CHUNK_CHARS: usize = 2000;
const SUMMARY_INPUT_CHARS: usize = 50_000;
const PLAN_SUMMARY_CHARS: usize = 10_000;
const TOPIC_MATCH_LIMIT: usize = 5;
const TOPIC_MATCH_CHARS: usize = 2000;
const TOPIC_FALLBACK_CHUNKS: usize = 3;
const TOPIC_FALLBACK_CHARS: usize = 1000;

/// One multiple-choice question as the model is asked to emit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTopic {
    pub title: String,
    #[serde(default)]
    pub time_minutes: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDay {
    pub date: String,
    #[serde(default)]
    pub day_number: Option<u32>,
    pub title: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub topics: Vec<PlanTopic>,
    #[serde(default)]
    pub review_focus: Option<String>,
}

/// What kind of material the plan is built from; steers the goal
/// instruction in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MaterialKind {
    /// Lecture script or slides.
    #[default]
    Script,
    /// A past exam; the plan becomes an exam-solving strategy.
    Exam,
    /// Exercise sheets; the plan focuses on actively solving them.
    Exercises,
}

impl MaterialKind {
    fn goal_instruction(self) -> &'static str {
        match self {
            MaterialKind::Script => "Erstelle einen Lernplan, der den Stoff logisch aufteilt.",
            MaterialKind::Exam => {
                "Dies ist eine PRÜFUNG/KLAUSUR. Analysiere die Aufgabenstellungen und Themen \
                 der Prüfung. Der Lernplan soll eine Strategie sein, um genau diese Art von \
                 Aufgaben zu lösen. Plane Übungseinheiten für ähnliche Aufgaben ein!"
            }
            MaterialKind::Exercises => {
                "Dies sind Übungsblätter. Der Lernplan soll sich auf das aktive Lösen dieser \
                 Aufgaben konzentrieren."
            }
        }
    }
}

/// Parameters for one study-plan generation.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// The exact study dates, one plan day each.
    pub dates: Vec<NaiveDate>,
    pub kind: MaterialKind,
    /// Optional topic the plan should lean towards.
    pub focus: Option<String>,
    /// Previously generated document summary, given to the model as linking
    /// reference when available.
    pub summary: Option<String>,
}

/// Generate a short multiple-choice quiz from randomly sampled chunks.
#[inline]
pub fn generate_quiz(chunks: &[Chunk], generator: &dyn TextGenerator) -> Result<Vec<QuizQuestion>> {
    generate_quiz_with_rng(chunks, generator, &mut rand::thread_rng())
}

/// Like [`generate_quiz`], with the sampling source injected so tests are
/// deterministic.
#[inline]
pub fn generate_quiz_with_rng<R: Rng + ?Sized>(
    chunks: &[Chunk],
    generator: &dyn TextGenerator,
    rng: &mut R,
) -> Result<Vec<QuizQuestion>> {
    if chunks.is_empty() {
        return Err(StudyError::Generation(
            "no chunks available for quiz generation".to_string(),
        ));
    }

    let selected: Vec<&Chunk> = chunks
        .choose_multiple(rng, QUIZ_SAMPLE_SIZE.min(chunks.len()))
        .collect();

    let context: String = selected
        .iter()
        .map(|c| format!("\n[Seite {}]: {}\n", c.page, c.text))
        .collect();

    let prompt = quiz_prompt(&context);

    info!("Requesting quiz over {} sampled chunks", selected.len());
    let output = generator.generate(&prompt)?;

    parse_model_array(&output)
}

fn quiz_prompt(context: &str) -> String {
    format!(
        r#"Basierend auf folgendem Text, erstelle 3 Multiple-Choice-Fragen.
Der Output MUSS valides JSON sein in diesem Format:
[
    {{
        "question": "Frage hier (inkl. Seitenreferenz falls möglich)",
        "options": ["Option A", "Option B", "Option C", "Option D"],
        "answer": "Die richtige Option (exakter String)"
    }}
]

Text:
{context}"#
    )
}

/// Pick plan context chunks: everything for small collections, otherwise an
/// even stride across the whole collection so the plan covers the document
/// start to end.
#[inline]
pub fn sample_for_plan(chunks: &[Chunk]) -> Vec<&Chunk> {
    if chunks.len() <= PLAN_SAMPLE_LIMIT {
        return chunks.iter().collect();
    }

    let step = (chunks.len() / PLAN_SAMPLE_LIMIT).max(1);
    chunks.iter().step_by(step).collect()
}

/// Generate a day-by-day study plan over the given dates.
#[inline]
pub fn generate_plan(
    chunks: &[Chunk],
    request: &PlanRequest,
    generator: &dyn TextGenerator,
) -> Result<Vec<PlanDay>> {
    if chunks.is_empty() {
        return Err(StudyError::Generation(
            "no chunks available for plan generation".to_string(),
        ));
    }
    if request.dates.is_empty() {
        return Err(StudyError::Generation(
            "no study dates given for the plan".to_string(),
        ));
    }

    let sample = sample_for_plan(chunks);
    debug!(
        "Sampled {}/{} chunks for plan context",
        sample.len(),
        chunks.len()
    );

    let context: String = sample
        .iter()
        .map(|c| {
            format!(
                "\n=== SOURCE_START [Seite {}] ===\n{}\n=== SOURCE_END ===\n",
                c.page,
                truncate_chars(&c.text, PLAN_CHUNK_CHARS)
            )
        })
        .collect();

    let prompt = plan_prompt(request, &context);

    info!(
        "Requesting study plan for {} sessions over {} context chunks",
        request.dates.len(),
        sample.len()
    );
    let output = generator.generate(&prompt)?;

    parse_model_array(&output)
}

fn plan_prompt(request: &PlanRequest, context: &str) -> String {
    let date_list = request
        .dates
        .iter()
        .map(|d| d.format("%d.%m.%Y").to_string())
        .join(", ");

    let focus_context = request.focus.as_deref().map_or_else(
        || {
            "Fokus: Decke den gesamten Inhalt des Dokuments gleichmäßig ab. \
             Erfinde KEINE Themen, die nicht im Text vorkommen."
                .to_string()
        },
        |focus| {
            format!("Fokus-Thema des Nutzers: {focus}. (Richte den Plan stark danach aus)")
        },
    );

    let summary_context = request.summary.as_deref().map_or_else(String::new, |summary| {
        format!(
            "\n**Referenz-Zusammenfassung (Nutze die IDs hieraus für Links):**\n{}...\n(Gekürzt)",
            truncate_chars(summary, PLAN_SUMMARY_CHARS)
        )
    });

    format!(
        r#"**Rolle**: Du bist ein strategischer Lern-Coach.
Erstelle einen ultimativen Lernplan ("Roadmap to Success").

**Parameter**:
- Zeitraum: {days} Tage (Exakt!).
- Termine: {date_list}.
- Ziel: Perfekte Prüfungsvorbereitung.

**Konzept**:
1. **Tagessatz**: Jeder Tag hat ein klares Motto (z.B. "Grundlagen", "Deep Dive", "Wiederholung").
2. **Lernziele**: 3-5 konkrete Ziele pro Tag (Was kann ich am Ende?).
3. **Inhalte**: Detaillierte Schritte.
4. **Didaktik**:
   - Start: Grundlagen.
   - Mitte: Komplexes & Transfer.
   - Ende (letzte 20%): Wiederholung & Simulation.
   - Baue "Spaced Repetition" ein (Wiederhole Thema von Tag 1 an Tag 4).

**Formatierung & Links**:
- Verlinke auf die Zusammenfassung mittels `[Siehe Zusammenfassung](#thema-ID)`.
- Verlinke auf das Original-Dokument: `[📄 S. 12](#page=12)`.
- Nutze Emojis: 📖 (Lesen), ✍️ (Üben), 🔄 (Wiederholen).

**Input Text (Auszüge)**:
{context}
{summary_context}

**Input Metadaten**:
- Typ: {goal}
- {focus_context}

**Output Format (Strict JSON)**:
[
    {{
        "date": "DD.MM.YYYY",
        "day_number": 1,
        "title": "Motto des Tages",
        "objectives": ["Ziel 1", "Ziel 2", "Ziel 3"],
        "topics": [
            {{
                "title": "Thema A",
                "time_minutes": 45,
                "description": "Lies Abschnitt X. Verstehe Y.",
                "links": ["[Siehe Zusammenfassung](#thema-1)", "[📄 S. 12](#page=12)"],
                "rationale": "Wichtig für das Verständnis von Z."
            }}
        ],
        "review_focus": "Was soll wiederholt werden?"
    }}
]"#,
        days = request.dates.len(),
        date_list = date_list,
        context = context,
        summary_context = summary_context,
        goal = request.kind.goal_instruction(),
        focus_context = focus_context,
    )
}

/// Generate a structured Markdown summary over the whole chunk collection.
#[inline]
pub fn generate_summary(
    chunks: &[Chunk],
    language: &str,
    focus: Option<&str>,
    generator: &dyn TextGenerator,
) -> Result<String> {
    if chunks.is_empty() {
        return Err(StudyError::Generation(
            "no chunks available for summary generation".to_string(),
        ));
    }

    let all_text = truncate_chars(
        &chunks.iter().map(|c| c.text.as_str()).join("\n"),
        SUMMARY_INPUT_CHARS,
    );
    let source = chunks
        .first()
        .map_or("Dokument", |c| c.source.as_str());

    let prompt = summary_prompt(&all_text, source, language, focus);

    info!("Requesting full summary ({} input chars)", all_text.chars().count());
    generator.generate(&prompt)
}

fn summary_prompt(text: &str, source: &str, language: &str, focus: Option<&str>) -> String {
    let focus_instruction = focus.map_or_else(
        || {
            "**FOKUS**: Erstelle eine umfassende, neutrale Zusammenfassung, die alle \
             Hauptthemen des Textes abdeckt. Identifiziere Schlüsselkonzepte und erkläre \
             sie verständlich."
                .to_string()
        },
        |focus| {
            format!(
                "**FOKUS**: Der Nutzer möchte besonders folgendes beachtet haben: '{focus}'. \
                 Richte die Zusammenfassung stark danach aus!"
            )
        },
    );

    format!(
        r#"**Rolle**: Du bist ein Lern-Assistent für Studenten ("Study Buddy").
**Sprache**: {language} (Antworte zwingend in dieser Sprache!).

**Aufgabe**:
Erstelle eine extrem strukturierte Zusammenfassung für eine Lern-App.
Der Nutzer will effizient lernen.

{focus_instruction}

**STRIKTE REGELN (QUELLE):**
1. Nutze **AUSSCHLIESSLICH** den untenstehenden 'Input Text'.
2. Ignoriere alles Wissen aus vorherigen Dokumenten oder Sitzungen.
3. Nenne zu Beginn die **Quelle** (Dateiname) und das **Hauptthema**.
4. Starte die Zusammenfassung mit: 'Diese Zusammenfassung basiert exakt auf der Datei {source}...'

**Output Struktur (WICHTIG)**:
1. **Thematische Blöcke**: Teile den Inhalt in logische Abschnitte.
2. **IDs**: Nutze KEINE manuellen HTML-Anker. Nutze stattdessen Standard-Markdown-Überschriften.
3. **Formatierung**:
   - Nutze `<mark>markierter Text</mark>` für Definitionen und Schlüsselbegriffe.
   - Nutze **Fett** für Wichtiges.
   - Nutze Emojis.

**Inhaltliches Format**:
# Zusammenfassung

## Inhaltsverzeichnis
- [1. Titel Thema](#1-titel-thema) (Achte auf Kleinschreibung und Bindestriche!)
- [2. Titel Thema](#2-titel-thema)

## 1. Titel Thema
... Inhalt ...
Definition: <mark>Begriff</mark> ist ...

**Input Text**:
{text}"#
    )
}

/// Flashcard-style summary for a single study-plan topic. Chunks are
/// keyword-filtered by the topic title; when nothing matches, the first few
/// chunks stand in.
#[inline]
pub fn generate_topic_summary(
    topic_title: &str,
    chunks: &[Chunk],
    generator: &dyn TextGenerator,
) -> Result<String> {
    if chunks.is_empty() {
        return Err(StudyError::Generation(
            "no chunks available for topic summary".to_string(),
        ));
    }

    let relevant_text = topic_context(topic_title, chunks);
    let prompt = format!(
        r#"**Aufgabe**: Erstelle eine ultrakurze, knackige Zusammenfassung (Flashcard-Style) für das Thema: '{topic_title}'.

**Format**:
- **Definition**: <mark>1 Satz Definition</mark>.
- **Wichtig**: 3 Bulletpoints.
- **Beispiel**: 1 kurzes Beispiel.

**Kontext**:
{relevant_text}"#
    );

    generator.generate(&prompt)
}

fn topic_context(topic_title: &str, chunks: &[Chunk]) -> String {
    let keywords: Vec<String> = topic_title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();

    let matching: Vec<String> = chunks
        .iter()
        .filter(|c| {
            let lower = c.text.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
        .take(TOPIC_MATCH_LIMIT)
        .map(|c| truncate_chars(&c.text, TOPIC_MATCH_CHARS))
        .collect();

    if matching.is_empty() {
        // No keyword hits; fall back to the document opening.
        chunks
            .iter()
            .take(TOPIC_FALLBACK_CHUNKS)
            .map(|c| truncate_chars(&c.text, TOPIC_FALLBACK_CHARS))
            .join("\n")
    } else {
        matching.join("\n")
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}
