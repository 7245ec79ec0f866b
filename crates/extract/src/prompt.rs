use crate::schema::ExtractionSchema;

fn describe(allowed: &[String]) -> String {
    if allowed.is_empty() {
        "any".to_string()
    } else {
        allowed.join(", ")
    }
}

pub fn build_extraction_prompt(schema: &ExtractionSchema, chunk_text: &str) -> String {
    let node_types = describe(&schema.allowed_nodes);
    let relationship_types = describe(&schema.allowed_relationships);

    format!(
        r#"You are a top-tier algorithm designed for extracting information in structured formats to build a knowledge graph.
Extract entities and the relationships between them from the following text.

INSTRUCTIONS:
1. Each entity needs a name ("head" / "tail") and a type ("head_type" / "tail_type")
2. Each relationship is directed from "head" to "tail"
3. Output ONLY valid JSON, nothing else
4. Use the exact schema below

SCHEMA:
[
  {{"head": "EntityName", "head_type": "EntityType", "relation": "RELATIONSHIP_TYPE", "tail": "EntityName", "tail_type": "EntityType"}}
]

RULES:
- Allowed entity types: {node_types}
- Allowed relationship types: {relationship_types}
- Use the most complete name for an entity every time it appears
- Do not add entities or relationships that are not stated in the text
- Output ONLY the JSON array, no markdown, no explanations

TEXT:
{chunk_text}

JSON OUTPUT:"#
    )
}
