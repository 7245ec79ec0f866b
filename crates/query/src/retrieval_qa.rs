use anyhow::{Context, Result};
use extract::LanguageModel;
use index::{RetrievedDocument, Retriever};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::prompt::PromptTemplate;

pub const NONE_QUERY_ERROR: &str = "Error: Query cannot be None";

/// "Stuff" chain: every retrieved document goes into one prompt.
pub struct RetrievalQA {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LanguageModel>,
    prompt: PromptTemplate,
}

impl RetrievalQA {
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            retriever,
            llm,
            prompt: PromptTemplate::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    /// Retrieve, fill the template and return the model's answer verbatim.
    pub async fn run(&self, question: &str) -> Result<String> {
        let documents = self.retriever
            .retrieve(question)
            .await
            .context("Retrieval failed")?;
        debug!(documents = documents.len(), "Retrieved context");

        let prompt = self.prompt.format(&stuff_documents(&documents), question);

        self.llm
            .generate(&prompt)
            .await
            .context("Answer generation failed")
    }

    /// Form-facing entry point: never fails, errors come back as text.
    pub async fn answer_query(&self, query: Option<&str>) -> String {
        let Some(query) = query else {
            return NONE_QUERY_ERROR.to_string();
        };

        match self.run(query).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Query failed");
                format!("Error: {e:#}")
            }
        }
    }
}

fn stuff_documents(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRetriever {
        documents: Vec<RetrievedDocument>,
        calls: AtomicUsize,
    }

    impl FixedRetriever {
        fn new(texts: &[&str]) -> Self {
            Self {
                documents: texts
                    .iter()
                    .enumerate()
                    .map(|(i, t)| RetrievedDocument {
                        id: format!("chunk-{i}"),
                        text: t.to_string(),
                        score: 1.0,
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.documents.clone())
        }
    }

    struct BrokenRetriever;

    #[async_trait]
    impl Retriever for BrokenRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>> {
            anyhow::bail!("vector index 'vector' does not exist")
        }
    }

    struct EchoModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Frank Herbert wrote Dune. thanks for asking!".to_string())
        }
    }

    fn echo_model() -> Arc<EchoModel> {
        Arc::new(EchoModel {
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_none_query_skips_retrieval() {
        let retriever = Arc::new(FixedRetriever::new(&["x"]));
        let model = echo_model();
        let qa = RetrievalQA::new(retriever.clone(), model.clone());

        assert_eq!(qa.answer_query(None).await, "Error: Query cannot be None");
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 0);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_is_returned_verbatim() {
        let retriever = Arc::new(FixedRetriever::new(&[
            "\ntext: Dune is a novel by Frank Herbert.",
            "\ntext: It was published by Chilton Books.",
        ]));
        let model = echo_model();
        let qa = RetrievalQA::new(retriever.clone(), model.clone());

        let answer = qa.answer_query(Some("Who wrote Dune?")).await;

        assert_eq!(answer, "Frank Herbert wrote Dune. thanks for asking!");
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains(
            "\ntext: Dune is a novel by Frank Herbert.\n\n\ntext: It was published by Chilton Books.\nQuestion: Who wrote Dune?"
        ));
    }

    #[tokio::test]
    async fn test_empty_query_is_not_rejected() {
        let retriever = Arc::new(FixedRetriever::new(&[]));
        let qa = RetrievalQA::new(retriever.clone(), echo_model());

        let answer = qa.answer_query(Some("")).await;

        assert!(!answer.starts_with("Error: "));
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_internal_fault_becomes_error_text() {
        let qa = RetrievalQA::new(Arc::new(BrokenRetriever), echo_model());

        let answer = qa.answer_query(Some("Who wrote Dune?")).await;

        assert!(answer.starts_with("Error: "));
        assert!(answer.contains("does not exist"));
    }

    #[tokio::test]
    async fn test_run_propagates_errors() {
        let qa = RetrievalQA::new(Arc::new(BrokenRetriever), echo_model());
        assert!(qa.run("Who wrote Dune?").await.is_err());
    }

    #[tokio::test]
    async fn test_custom_prompt() {
        let model = echo_model();
        let qa = RetrievalQA::new(Arc::new(FixedRetriever::new(&["ctx"])), model.clone())
            .with_prompt(PromptTemplate::new("[{context}] {question}").unwrap());

        qa.run("q").await.unwrap();
        assert_eq!(model.prompts.lock().unwrap()[0], "[ctx] q");
    }
}
