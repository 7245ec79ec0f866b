pub mod prompt;
pub mod retrieval_qa;

pub use prompt::{PromptTemplate, QA_TEMPLATE};
pub use retrieval_qa::{NONE_QUERY_ERROR, RetrievalQA};
