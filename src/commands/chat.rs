//! `chat` command: interactive hybrid chat over a snapshot.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::chat::HybridChatSession;
use crate::config::Config;
use crate::graph::GraphStore;

/// Run an interactive session reading questions from stdin.
pub async fn run(snapshot: &Path, top_k: Option<usize>, config: &Config) -> Result<()> {
    let graph = GraphStore::load(snapshot)
        .with_context(|| format!("failed to load snapshot {}", snapshot.display()))?;
    let client = config
        .openai_client()
        .context("chat needs a configured chat model")?;

    let mut session =
        HybridChatSession::for_graph(Arc::new(client), Arc::new(graph), config.chat.clone());
    let top_k = top_k.unwrap_or(config.chat.top_k);

    println!("Ask about the graph. Commands: /clear, /stats, /quit");
    let stdin = BufReader::new(tokio::io::stdin());
    converse(&mut session, stdin, top_k).await?;
    Ok(())
}

/// Answer every line of `input` until EOF or `/quit`; returns the number of answers.
pub async fn converse<R>(session: &mut HybridChatSession, input: R, top_k: usize) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut answered = 0;

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear();
                println!("History cleared.");
            }
            "/stats" => {
                let stats = session.stats();
                println!(
                    "messages: {} (user {}, assistant {}), indexed documents: {}",
                    stats.message_count,
                    stats.user_messages,
                    stats.assistant_messages,
                    stats.indexed_documents
                );
            }
            _ => match session.send_message(question, top_k).await {
                Ok(reply) => {
                    println!("\n{}\n", reply.message);
                    if !reply.sources.is_empty() {
                        println!("Sources: {}\n", reply.sources.join(", "));
                    }
                    answered += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Chat turn failed");
                    println!("Sorry, I encountered an error processing your request.\n");
                }
            },
        }
    }

    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatConfig, LocalAbstractIndex};
    use crate::integrations::{ChatModel, CompletionRequest};
    use crate::Error;
    use futures::future::BoxFuture;

    struct EchoModel;

    impl ChatModel for EchoModel {
        fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, crate::Result<String>> {
            let n = request.messages.len();
            Box::pin(async move {
                if n > 3 {
                    Err(Error::LlmError("too long".to_string()))
                } else {
                    Ok(format!("answer with {} messages", n))
                }
            })
        }
    }

    fn session() -> HybridChatSession {
        let mut index = LocalAbstractIndex::new();
        index.add("1", "Aspirin", "Aspirin inhibits COX2.");
        HybridChatSession::new(Arc::new(EchoModel), Arc::new(index), ChatConfig::default())
    }

    #[tokio::test]
    async fn answers_until_quit() {
        let mut session = session();
        let input: &[u8] = b"aspirin?\n\n/stats\nCOX2?\n/quit\nignored\n";

        let answered = converse(&mut session, input, 5).await.unwrap();

        assert_eq!(answered, 2);
        assert_eq!(session.history().len(), 4);
    }

    #[tokio::test]
    async fn failed_turns_do_not_stop_the_loop() {
        let mut session = session();
        // third question sees 4 prior turns plus itself and fails; /clear recovers
        let input: &[u8] = b"one\ntwo\nthree\n/clear\nfour\n";

        let answered = converse(&mut session, input, 5).await.unwrap();

        assert_eq!(answered, 3);
        assert_eq!(session.history().len(), 2);
    }
}
