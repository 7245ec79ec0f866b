use anyhow::{Result, bail};

/// Answering instructions; the model is told to close with a fixed phrase.
pub const QA_TEMPLATE: &str = r#"Use the following pieces of context to answer the question at the end. 
If you don't know the answer, just say that you don't know, don't try to make up an answer. 
Use three sentences maximum and keep the answer as concise as possible. 
Always say "thanks for asking!" at the end of the answer. 
{context}
Question: {question}
Helpful Answer:"#;

const CONTEXT: &str = "{context}";
const QUESTION: &str = "{question}";

#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: QA_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT, QUESTION] {
            if !template.contains(placeholder) {
                bail!("Prompt template is missing the {} placeholder", placeholder);
            }
        }
        Ok(Self { template })
    }

    /// Substitute both placeholders in one pass, so placeholder text inside
    /// the substituted values is left alone.
    pub fn format(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        loop {
            let next = [(CONTEXT, context), (QUESTION, question)]
                .into_iter()
                .filter_map(|(placeholder, value)| rest.find(placeholder).map(|at| (at, placeholder, value)))
                .min_by_key(|(at, _, _)| *at);

            match next {
                Some((at, placeholder, value)) => {
                    out.push_str(&rest[..at]);
                    out.push_str(value);
                    rest = &rest[at + placeholder.len()..];
                }
                None => {
                    out.push_str(rest);
                    return out;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template() {
        let prompt = PromptTemplate::default().format("Dune was written by Frank Herbert.", "Who wrote Dune?");

        assert!(prompt.starts_with("Use the following pieces of context"));
        assert!(prompt.contains("Always say \"thanks for asking!\" at the end of the answer. \n"));
        assert!(prompt.ends_with(
            "Dune was written by Frank Herbert.\nQuestion: Who wrote Dune?\nHelpful Answer:"
        ));
    }

    #[test]
    fn test_missing_placeholder_rejected() {
        assert!(PromptTemplate::new("Answer: {question}").is_err());
        assert!(PromptTemplate::new("{context} only").is_err());
        assert!(PromptTemplate::new("{context} / {question}").is_ok());
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let template = PromptTemplate::new("C={context} Q={question}").unwrap();
        assert_eq!(template.format("{question}", "q"), "C={question} Q=q");
    }

    #[test]
    fn test_repeated_placeholders() {
        let template = PromptTemplate::new("{question}? {context} {question}!").unwrap();
        assert_eq!(template.format("ctx", "why"), "why? ctx why!");
    }
}
