use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use console::style;
use dialoguer::Input;
use tracing::info;

use crate::StudyError;
use crate::chunking::{Chunk, chunk_pages};
use crate::config::{Config, default_data_dir};
use crate::embeddings::gemini::GeminiClient;
use crate::extract::extract_all;
use crate::generate::{
    MaterialKind, PlanDay, PlanRequest, generate_plan, generate_quiz, generate_summary,
    generate_topic_summary,
};
use crate::index::IndexSnapshot;
use crate::pipeline::{BuildOutcome, BuildReport, build_from_store};
use crate::qa::answer_question;
use crate::storage::{ArtifactKind, ArtifactStore, BlobStore, LocalBlobStore};

/// Build the index for a document folder and report what happened.
#[inline]
pub fn analyze(docs: &Path) -> Result<()> {
    let config = Config::load_default()?;
    let client = GeminiClient::new(&config)?;
    let store = LocalBlobStore::new(docs);

    let outcome = build_from_store(&store, &client, &config.chunking, true)?;
    print_report(&outcome.report);

    match &outcome.snapshot {
        Some(snapshot) => println!(
            "✅ Index erstellt: {} Chunks, Dimension {}",
            snapshot.len(),
            snapshot.dimension()
        ),
        None => print_no_index(),
    }

    Ok(())
}

/// Answer a single question against a freshly built index.
#[inline]
pub fn ask(docs: &Path, question: &str, show_context: bool) -> Result<()> {
    let config = Config::load_default()?;
    let client = GeminiClient::new(&config)?;
    let store = LocalBlobStore::new(docs);

    let outcome = build_from_store(&store, &client, &config.chunking, true)?;
    print_warnings(&outcome.report);

    let Some(snapshot) = outcome.snapshot else {
        print_no_index();
        return Ok(());
    };

    answer_one(question, &snapshot, &client, show_context);
    Ok(())
}

/// Interactive question loop over one built index. The snapshot is rebuilt
/// (and swapped in only on success) when the user asks for a re-analysis.
#[inline]
pub fn session(docs: &Path, show_context: bool) -> Result<()> {
    let config = Config::load_default()?;
    let client = GeminiClient::new(&config)?;
    let store = LocalBlobStore::new(docs);

    let outcome = build_from_store(&store, &client, &config.chunking, true)?;
    print_report(&outcome.report);

    let Some(mut snapshot) = outcome.snapshot else {
        print_no_index();
        return Ok(());
    };

    println!(
        "💬 {} Chunks indexiert. Leere Eingabe oder 'exit' beendet, 'reanalyze' baut den Index neu.",
        snapshot.len()
    );

    loop {
        let input: String = Input::new()
            .with_prompt("Frage")
            .allow_empty(true)
            .interact_text()?;
        let input = input.trim();

        match input {
            "" | "exit" | "quit" => break,
            "reanalyze" => {
                match build_from_store(&store, &client, &config.chunking, true) {
                    Ok(BuildOutcome {
                        snapshot: Some(rebuilt),
                        report,
                    }) => {
                        print_report(&report);
                        // Swap in the fresh snapshot only now that it exists.
                        snapshot = rebuilt;
                        println!("🔄 Index neu aufgebaut: {} Chunks", snapshot.len());
                    }
                    Ok(BuildOutcome { snapshot: None, .. }) => {
                        println!(
                            "{}",
                            style("⚠ Neuaufbau ergab keinen Index; der bisherige bleibt aktiv.")
                                .yellow()
                        );
                    }
                    Err(e) => {
                        println!("{}", style(format!("⚠ Neuaufbau fehlgeschlagen: {e}")).yellow());
                    }
                }
            }
            question => answer_one(question, &snapshot, &client, show_context),
        }
    }

    Ok(())
}

fn answer_one(question: &str, snapshot: &IndexSnapshot, client: &GeminiClient, show_context: bool) {
    match answer_question(question, snapshot, client, client) {
        Ok(answer) => {
            println!();
            println!("{}", answer.text);
            if show_context {
                println!();
                println!("{}", style("Verwendeter Kontext:").dim());
                println!("{}", style(&answer.context).dim());
            }
            println!();
        }
        // Failed answers surface as messages; the session itself continues.
        Err(e) => println!(
            "{}",
            style(format!("Fehler bei der Antwortgenerierung: {e}")).red()
        ),
    }
}

/// Generate a multiple-choice quiz from the documents.
#[inline]
pub fn quiz(docs: &Path, save: bool) -> Result<()> {
    let config = Config::load_default()?;
    let client = GeminiClient::new(&config)?;

    let Some(chunks) = load_chunks(docs, &config)? else {
        return Ok(());
    };

    let questions = match generate_quiz(&chunks, &client) {
        Ok(questions) => questions,
        Err(e) => return print_generation_failure(e),
    };

    for (i, q) in questions.iter().enumerate() {
        println!();
        println!("{} {}", style(format!("Frage {}:", i + 1)).bold(), q.question);
        for (option, letter) in q.options.iter().zip(['A', 'B', 'C', 'D']) {
            println!("  {letter}) {option}");
        }
        println!("  {} {}", style("Antwort:").green(), q.answer);
    }

    if save {
        let path = artifact_store()?.save(ArtifactKind::Quiz, &project_name(docs), &questions)?;
        println!();
        println!("💾 Quiz gespeichert: {}", path.display());
    }

    Ok(())
}

/// Generate a day-by-day study plan from the documents.
#[inline]
pub fn plan(
    docs: &Path,
    start: NaiveDate,
    days: u16,
    kind: MaterialKind,
    focus: Option<String>,
    topic_summaries: bool,
    save: bool,
) -> Result<()> {
    let config = Config::load_default()?;
    let client = GeminiClient::new(&config)?;

    let Some(chunks) = load_chunks(docs, &config)? else {
        return Ok(());
    };

    let dates: Vec<NaiveDate> = (0..days)
        .filter_map(|offset| start.checked_add_days(Days::new(u64::from(offset))))
        .collect();

    let request = PlanRequest {
        dates,
        kind,
        focus,
        summary: None,
    };

    let plan_days = match generate_plan(&chunks, &request, &client) {
        Ok(plan_days) => plan_days,
        Err(e) => return print_generation_failure(e),
    };

    print_plan(&plan_days);

    if topic_summaries {
        print_topic_summaries(&plan_days, &chunks, &client);
    }

    if save {
        let path = artifact_store()?.save(ArtifactKind::Plan, &project_name(docs), &plan_days)?;
        println!();
        println!("💾 Lernplan gespeichert: {}", path.display());
    }

    Ok(())
}

/// One flashcard summary per plan topic. A failed topic is reported and the
/// rest keep going.
fn print_topic_summaries(plan_days: &[PlanDay], chunks: &[Chunk], client: &GeminiClient) {
    let titles: Vec<&str> = plan_days
        .iter()
        .flat_map(|day| day.topics.iter().map(|t| t.title.as_str()))
        .collect();

    for title in titles {
        println!();
        println!("{}", style(format!("📌 {title}")).bold());
        match generate_topic_summary(title, chunks, client) {
            Ok(text) => println!("{text}"),
            Err(e) => println!(
                "{}",
                style(format!("Konnte Zusammenfassung nicht erstellen: {e}")).yellow()
            ),
        }
    }
}

/// Generate a structured summary of the documents.
#[inline]
pub fn summary(docs: &Path, language: &str, focus: Option<&str>, save: bool) -> Result<()> {
    let config = Config::load_default()?;
    let client = GeminiClient::new(&config)?;

    let Some(chunks) = load_chunks(docs, &config)? else {
        return Ok(());
    };

    let text = match generate_summary(&chunks, language, focus, &client) {
        Ok(text) => text,
        Err(e) => return print_generation_failure(e),
    };

    println!("{text}");

    if save {
        let path = artifact_store()?.save(ArtifactKind::Summary, &project_name(docs), &text)?;
        println!();
        println!("💾 Zusammenfassung gespeichert: {}", path.display());
    }

    Ok(())
}

/// List the documents in a folder the way the indexer will see them.
#[inline]
pub fn list_documents(docs: &Path) -> Result<()> {
    let store = LocalBlobStore::new(docs);
    let names = store.list()?;

    if names.is_empty() {
        println!("Keine PDF-Dokumente in {}.", docs.display());
        return Ok(());
    }

    println!("📚 {} Dokumente:", names.len());
    for name in names {
        println!("  {name}");
    }
    Ok(())
}

/// Copy a PDF into the document folder.
#[inline]
pub fn add_document(docs: &Path, file: &Path) -> Result<()> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("File has no usable name")?;
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let store = LocalBlobStore::new(docs);
    store.save(name, &bytes)?;
    println!("📄 {} hinzugefügt ({} Bytes).", name, bytes.len());
    Ok(())
}

/// Remove a document from the folder.
#[inline]
pub fn remove_document(docs: &Path, name: &str) -> Result<()> {
    let store = LocalBlobStore::new(docs);
    if store.delete(name)? {
        println!("🗑 {name} gelöscht.");
    } else {
        println!("{name} existiert nicht.");
    }
    Ok(())
}

/// Extract and chunk without embedding; enough for quiz/plan/summary, which
/// sample chunks directly instead of searching the index.
fn load_chunks(docs: &Path, config: &Config) -> Result<Option<Vec<Chunk>>> {
    let store = LocalBlobStore::new(docs);
    let names = store.list()?;

    let mut documents = Vec::with_capacity(names.len());
    for name in &names {
        match store.read(name) {
            Ok(bytes) => documents.push((name.as_str(), bytes)),
            Err(e) => println!("{}", style(format!("⚠ {name} übersprungen: {e}")).yellow()),
        }
    }

    let extraction = extract_all(documents);
    for warning in &extraction.warnings {
        println!("{}", style(format!("⚠ {warning}")).yellow());
    }

    let chunks = chunk_pages(&extraction.pages, &config.chunking);
    if chunks.is_empty() {
        println!("⚠ Kein Text gefunden. Bitte zuerst lesbare PDFs hinzufügen.");
        return Ok(None);
    }

    info!("Loaded {} chunks from {}", chunks.len(), docs.display());
    Ok(Some(chunks))
}

fn print_plan(plan_days: &[PlanDay]) {
    for day in plan_days {
        println!();
        println!(
            "{}",
            style(format!("📅 {} — {}", day.date, day.title)).bold()
        );
        for objective in &day.objectives {
            println!("  🎯 {objective}");
        }
        for topic in &day.topics {
            println!("  • {} ({} min)", style(&topic.title).cyan(), topic.time_minutes);
            if !topic.description.is_empty() {
                println!("    {}", topic.description);
            }
        }
        if let Some(review) = &day.review_focus {
            println!("  🔄 Wiederholung: {review}");
        }
    }
}

/// Malformed model output is shown to the user instead of being discarded;
/// everything else propagates.
fn print_generation_failure(error: StudyError) -> Result<()> {
    match error {
        StudyError::MalformedOutput { raw } => {
            println!(
                "{}",
                style("⚠ Die Antwort des Modells war kein gültiges JSON. Rohausgabe:").yellow()
            );
            println!("{raw}");
            Ok(())
        }
        other => Err(other.into()),
    }
}

fn print_report(report: &BuildReport) {
    println!(
        "📄 {} Dokumente, {} Seiten, {} Chunks ({} eingebettet, {} verworfen)",
        report.documents, report.pages, report.chunks, report.embedded, report.dropped
    );
    print_warnings(report);
}

fn print_warnings(report: &BuildReport) {
    for warning in &report.warnings {
        println!("{}", style(format!("⚠ {warning}")).yellow());
    }
}

fn print_no_index() {
    println!(
        "{}",
        style(
            "⚠ Kein Index erstellt (keine Embeddings erfolgreich). Bitte Dokumente prüfen \
             und Analyse erneut ausführen."
        )
        .yellow()
    );
}

fn project_name(docs: &Path) -> String {
    docs.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("default")
        .to_string()
}

fn artifact_store() -> Result<ArtifactStore> {
    Ok(ArtifactStore::new(default_data_dir()?))
}
