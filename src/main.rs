use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use studyrag::Result;
use studyrag::commands::{
    add_document, analyze, ask, list_documents, plan, quiz, remove_document, session, summary,
};
use studyrag::config::{run_interactive_config, show_config};
use studyrag::generate::MaterialKind;

#[derive(Parser)]
#[command(name = "studyrag")]
#[command(about = "Indexes PDF course material and answers questions grounded in it")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure models, chunking and retry behavior
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Extract, chunk and index a folder of PDFs, then report the result
    Analyze {
        /// Folder containing the PDF documents
        docs: PathBuf,
    },
    /// Ask a single question against the indexed documents
    Ask {
        /// Folder containing the PDF documents
        docs: PathBuf,
        /// The question to answer
        question: String,
        /// Also print the retrieved context
        #[arg(long)]
        show_context: bool,
    },
    /// Interactive question session over one index build
    Session {
        /// Folder containing the PDF documents
        docs: PathBuf,
        /// Also print the retrieved context for each answer
        #[arg(long)]
        show_context: bool,
    },
    /// Generate a multiple-choice quiz from the documents
    Quiz {
        /// Folder containing the PDF documents
        docs: PathBuf,
        /// Persist the quiz to the data directory
        #[arg(long)]
        save: bool,
    },
    /// Generate a day-by-day study plan
    Plan {
        /// Folder containing the PDF documents
        docs: PathBuf,
        /// First study day, e.g. 2026-09-01
        #[arg(long)]
        start: NaiveDate,
        /// Number of consecutive study days
        #[arg(long, default_value_t = 7)]
        days: u16,
        /// What kind of material this is
        #[arg(long, value_enum, default_value_t = MaterialKind::Script)]
        kind: MaterialKind,
        /// Topic the plan should lean towards
        #[arg(long)]
        focus: Option<String>,
        /// Also generate a flashcard summary per plan topic
        #[arg(long)]
        topic_summaries: bool,
        /// Persist the plan to the data directory
        #[arg(long)]
        save: bool,
    },
    /// Generate a structured summary of the documents
    Summary {
        /// Folder containing the PDF documents
        docs: PathBuf,
        /// Output language
        #[arg(long, default_value = "Deutsch")]
        language: String,
        /// Topic to focus the summary on
        #[arg(long)]
        focus: Option<String>,
        /// Persist the summary to the data directory
        #[arg(long)]
        save: bool,
    },
    /// Manage the document folder
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },
}

#[derive(Subcommand)]
enum DocsAction {
    /// List the PDFs the indexer will see
    List { docs: PathBuf },
    /// Copy a PDF into the folder
    Add { docs: PathBuf, file: PathBuf },
    /// Delete a PDF from the folder
    Remove { docs: PathBuf, name: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Analyze { docs } => {
            analyze(&docs)?;
        }
        Commands::Ask {
            docs,
            question,
            show_context,
        } => {
            ask(&docs, &question, show_context)?;
        }
        Commands::Session { docs, show_context } => {
            session(&docs, show_context)?;
        }
        Commands::Quiz { docs, save } => {
            quiz(&docs, save)?;
        }
        Commands::Plan {
            docs,
            start,
            days,
            kind,
            focus,
            topic_summaries,
            save,
        } => {
            plan(&docs, start, days, kind, focus, topic_summaries, save)?;
        }
        Commands::Summary {
            docs,
            language,
            focus,
            save,
        } => {
            summary(&docs, &language, focus.as_deref(), save)?;
        }
        Commands::Docs { action } => match action {
            DocsAction::List { docs } => list_documents(&docs)?,
            DocsAction::Add { docs, file } => add_document(&docs, &file)?,
            DocsAction::Remove { docs, name } => remove_document(&docs, &name)?,
        },
    }

    Ok(())
}
