use anyhow::{Context, Result};
use serde_json::Value;

use crate::schema::RawTriple;

/// Parse the model's answer into triples.
///
/// Accepts a bare array, an object wrapping the array under any key, or a
/// single triple object. Markdown code fences and prose around the JSON are
/// ignored.
pub fn parse_triples(response: &str) -> Result<Vec<RawTriple>> {
    let body = strip_code_fence(response.trim());

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(triples_from_value(value));
    }

    // Prose may contain brackets of its own, so try every opening bracket and
    // prefer the first JSON value that carries triples.
    let mut fallback = None;
    for (start, _) in body.match_indices(['[', '{']) {
        let Some(value) = first_json_value(&body[start..]) else {
            continue;
        };
        let triples = triples_from_value(value);
        if !triples.is_empty() {
            return Ok(triples);
        }
        fallback.get_or_insert(triples);
    }

    fallback.context("No JSON found in model response")
}

fn first_json_value(s: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(s)
        .into_iter::<Value>()
        .next()?
        .ok()
}

fn triples_from_value(value: Value) -> Vec<RawTriple> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(to_triple).collect(),
        Value::Object(map) if map.contains_key("head") => {
            to_triple(Value::Object(map)).into_iter().collect()
        }
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .map(|items| items.into_iter().filter_map(to_triple).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn to_triple(value: Value) -> Option<RawTriple> {
    match value {
        Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // drop the language tag line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
