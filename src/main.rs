//! rag-chat - terminal front end for the chat session controller
//!
//! Reads questions from stdin and prints answers as they stream in.

use rag_chat::search::SummaryLanguage;
use rag_chat::session::{Turn, TurnPhase};
use rag_chat::{
    ChatSessionController, ConversationSnapshot, LoggingClient, SendOptions, SendOutcome,
    SessionConfig, VectaraClient,
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "Commands: /retry, /new, /lang <code>, /quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with answers
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = SessionConfig::from_env();
    if config.is_complete() {
        tracing::info!(
            customer_id = %config.customer_id,
            corpora = ?config.corpus_ids,
            endpoint = %config.endpoint,
            language = %config.language,
            streaming = config.enable_streaming,
            "Session configured"
        );
    } else {
        tracing::warn!(
            "Missing credentials. Set RAG_CHAT_CUSTOMER_ID, RAG_CHAT_CORPUS_IDS and RAG_CHAT_API_KEY."
        );
    }

    let client = LoggingClient::new(VectaraClient::new()?);
    let controller = Arc::new(ChatSessionController::new(config, client));
    let renderer = tokio::spawn(render(controller.subscribe()));

    println!("Ask a question. {HELP}");
    let mut language: Option<SummaryLanguage> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let options = match line {
            "" => continue,
            "/quit" => break,
            "/help" => {
                println!("{HELP}");
                continue;
            }
            "/new" => {
                controller.start_new_conversation();
                println!("-- new conversation --");
                continue;
            }
            "/retry" => SendOptions::retry().with_language(language),
            _ if line.starts_with("/lang") => {
                let code = line.trim_start_matches("/lang").trim();
                match code.parse::<SummaryLanguage>() {
                    Ok(choice) => {
                        language = Some(choice);
                        println!("Answers will be in {}", choice.humanize());
                    }
                    Err(e) => println!("{e}"),
                }
                continue;
            }
            _ => SendOptions::default().with_language(language),
        };

        // Sends run in the background so /new can cancel them
        let controller = controller.clone();
        let question = line.to_string();
        tokio::spawn(async move {
            let outcome = controller.send_message(&question, options).await;
            report(&outcome);
        });
    }

    renderer.abort();
    Ok(())
}

fn report(outcome: &SendOutcome) {
    match outcome {
        SendOutcome::Answered | SendOutcome::Cancelled => {}
        SendOutcome::Ignored => println!("(nothing sent: still answering, or nothing to retry)"),
        SendOutcome::NoResults => println!("No results found for that question."),
        SendOutcome::Failed(e) => println!("Request failed: {e}. Type /retry to try again."),
    }
}

/// Print every snapshot change as it arrives
async fn render(rx: watch::Receiver<ConversationSnapshot>) {
    let mut printer = Printer::default();
    let mut snapshots = WatchStream::from_changes(rx);
    while let Some(snapshot) = snapshots.next().await {
        printer.render(&snapshot);
    }
}

/// Tracks what has reached the terminal so each change prints only its delta
#[derive(Default)]
struct Printer {
    /// Bytes of the current answer already printed
    printed: usize,
    /// History entries already printed
    settled: usize,
}

impl Printer {
    fn render(&mut self, snapshot: &ConversationSnapshot) {
        // A retry reopens the last entry; a new conversation empties history
        if snapshot.history.len() < self.settled {
            self.settled = snapshot.history.len();
            self.printed = 0;
        }

        for turn in snapshot.history.iter().skip(self.settled) {
            if turn.phase == TurnPhase::Resolved && !turn.answer.is_empty() {
                self.print_delta(&turn.answer);
                println!();
                print_citations(turn);
            } else if self.printed > 0 {
                println!();
            }
            self.printed = 0;
        }
        self.settled = snapshot.history.len();

        match &snapshot.active_turn {
            Some(turn) => self.print_delta(&turn.answer),
            None => self.printed = 0,
        }
        let _ = std::io::stdout().flush();
    }

    fn print_delta(&mut self, answer: &str) {
        if let Some(rest) = answer.get(self.printed..) {
            print!("{rest}");
            self.printed = answer.len();
        }
    }
}

fn print_citations(turn: &Turn) {
    for (i, result) in turn.results.iter().enumerate() {
        let label = result.label().unwrap_or(&result.id);
        match result.highlight_url() {
            Some(url) => println!("  [{}] {label} <{url}>", i + 1),
            None => println!("  [{}] {label}", i + 1),
        }
    }
    if let Some(score) = turn.factual_consistency {
        println!("  factual consistency: {score:.2}");
    }
}
