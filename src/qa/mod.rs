
use std::path::Path;

use tracing::{debug, info};

use crate::Result;
use crate::chunking::Chunk;
use crate::embeddings::{Embedder, TextGenerator};
use crate::index::IndexSnapshot;

/// Chunks retrieved per question.
pub const TOP_K: usize = 3;

/// A grounded answer plus the context it was grounded in, kept for display
/// and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub context: String,
}

/// Answer a free-text question from the indexed material: embed the query,
/// retrieve the nearest chunks, and generate once over the assembled
/// context.
///
/// Retrieval returns the nearest chunks regardless of how relevant they are;
/// the prompt instructs the model to disclose when the context does not
/// contain the answer.
#[inline]
pub fn answer_question(
    query: &str,
    snapshot: &IndexSnapshot,
    embedder: &dyn Embedder,
    generator: &dyn TextGenerator,
) -> Result<Answer> {
    let query_vector = embedder.embed_query(query)?;
    let hits = snapshot.nearest_chunks(&query_vector, TOP_K)?;

    debug!(
        "Retrieved {} chunks for question ({} indexed)",
        hits.len(),
        snapshot.len()
    );

    let context = build_context(hits.iter().map(|(chunk, _)| *chunk));
    let prompt = answer_prompt(query, &context);

    info!("Requesting grounded answer");
    let text = generator.generate(&prompt)?;

    Ok(Answer { text, context })
}

/// Assemble the grounding context in retrieval order: one `SOURCE:` block
/// per chunk with the document basename and page number.
#[inline]
pub fn build_context<'a, I>(chunks: I) -> String
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let mut context = String::new();
    for chunk in chunks {
        let source_file = Path::new(&chunk.source)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("Doc");
        context.push_str(&format!(
            "\nSOURCE: {} (Seite {}):\n{}\n---",
            source_file, chunk.page, chunk.text
        ));
    }
    context
}

fn answer_prompt(query: &str, context: &str) -> String {
    format!(
        r#"Beantworte die folgende Frage basierend auf dem bereitgestellten Kontext.
Wenn die Antwort nicht im Kontext steht, sage das.

WICHTIG: Gib die Seitenzahl an, wenn du Informationen aus dem Kontext verwendest (z.B. [Seite 5]).

Frage: {query}

Kontext:
{context}"#
    )
}
