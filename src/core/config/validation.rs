use serde_json::{Map, Value};

use crate::core::errors::RagError;

pub fn validate_config(config: &Value) -> Result<(), RagError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    for section_name in ["llm", "embedding"] {
        if let Some(section) = expect_optional_object(root, section_name)? {
            validate_optional_string_field(
                section,
                &format!("{}.base_url", section_name),
                "base_url",
            )?;
            validate_optional_string_field(section, &format!("{}.model", section_name), "model")?;
            validate_u64_field(
                section,
                &format!("{}.timeout_secs", section_name),
                "timeout_secs",
                1,
                3_600,
            )?;
        }
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_u64_field(embedding, "embedding.cache_size", "cache_size", 0, 1_000_000)?;
    }

    if let Some(reranker) = expect_optional_object(root, "reranker")? {
        validate_bool_field(reranker, "reranker.enabled", "enabled")?;
        validate_optional_string_field(reranker, "reranker.base_url", "base_url")?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.k", "k", 1, 10_000)?;
        validate_f64_field(
            retrieval,
            "retrieval.score_threshold",
            "score_threshold",
            -1.0,
            1.0,
        )?;
        validate_bool_field(retrieval, "retrieval.filter_enabled", "filter_enabled")?;
        validate_f64_field(
            retrieval,
            "retrieval.filter_threshold",
            "filter_threshold",
            -1.0,
            1.0,
        )?;
    }

    if let Some(context) = expect_optional_object(root, "context")? {
        validate_u64_field(
            context,
            "context.max_context_length",
            "max_context_length",
            1,
            10_000_000,
        )?;
    }

    if let Some(verification) = expect_optional_object(root, "verification")? {
        validate_bool_field(verification, "verification.enabled", "enabled")?;
    }

    if let Some(ingestion) = expect_optional_object(root, "ingestion")? {
        validate_optional_string_field(ingestion, "ingestion.docs_dir", "docs_dir")?;
        validate_u64_field(ingestion, "ingestion.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(
            ingestion,
            "ingestion.chunk_overlap",
            "chunk_overlap",
            0,
            1_000_000,
        )?;
        validate_u64_field(
            ingestion,
            "ingestion.min_chunk_length",
            "min_chunk_length",
            0,
            1_000_000,
        )?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65535)?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, RagError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(RagError::Config(format!(
            "'{}' must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !(min..=max).contains(&number) {
        return Err(RagError::Config(format!(
            "'{}' must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() {
        return Ok(());
    }
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(RagError::Config(format!("'{}' cannot be empty", path)));
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> RagError {
    RagError::Config(format!("'{}': expected {}", path, expected))
}
