//! Tool registry and dispatch.
//!
//! Tool names mirror the engine operations. A tool that addresses a
//! feature the mode gate has off returns a descriptive text result with
//! success status — disabled is not an error at the protocol level.

use recall_core::{
    AddOptions, BatchItem, Error, MemoryEngine, MetadataFilter, RecordMetadata, ScopeId,
    SearchRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Tool descriptors for `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    let scope_props = json!({
        "user_id": {"type": "string"},
        "sub_tenant_id": {"type": "string"},
        "session_id": {"type": "string"},
    });
    vec![
        json!({
            "name": "memory_add",
            "description": "Store a memory. Returns the record id; a duplicate returns the existing id.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "user_id": scope_props["user_id"],
                    "sub_tenant_id": scope_props["sub_tenant_id"],
                    "session_id": scope_props["session_id"],
                    "source": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "category": {"type": "string"},
                },
                "required": ["content", "user_id", "session_id"],
            },
        }),
        json!({
            "name": "memory_add_batch",
            "description": "Store many memories in one call. Honours skip_dedup and skip_llm.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "items": {"type": "array", "items": {"type": "object"}},
                    "user_id": {"type": "string"},
                    "session_id": {"type": "string"},
                    "skip_dedup": {"type": "boolean"},
                    "skip_llm": {"type": "boolean"},
                },
                "required": ["items", "user_id", "session_id"],
            },
        }),
        json!({
            "name": "memory_search",
            "description": "Multi-path fused search within a scope.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "user_id": {"type": "string"},
                    "session_id": {"type": "string"},
                    "top_k": {"type": "integer"},
                },
                "required": ["query", "user_id", "session_id"],
            },
        }),
        json!({
            "name": "memory_search_filtered",
            "description": "Search with source/tag/category/content-type filters.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "user_id": {"type": "string"},
                    "session_id": {"type": "string"},
                    "source": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "category": {"type": "string"},
                    "top_k": {"type": "integer"},
                },
                "required": ["query", "user_id", "session_id"],
            },
        }),
        json!({
            "name": "memory_context",
            "description": "Build a token-budgeted context block for a query.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "user_id": {"type": "string"},
                    "session_id": {"type": "string"},
                    "token_budget": {"type": "integer"},
                },
                "required": ["query", "user_id", "session_id"],
            },
        }),
        json!({
            "name": "memory_list",
            "description": "List recent memories in a scope, newest first.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "session_id": {"type": "string"},
                    "limit": {"type": "integer"},
                },
                "required": ["user_id", "session_id"],
            },
        }),
        json!({
            "name": "memory_get",
            "description": "Fetch one memory by id.",
            "inputSchema": {
                "type": "object",
                "properties": {"id": {"type": "string"}},
                "required": ["id"],
            },
        }),
        json!({
            "name": "memory_delete",
            "description": "Delete a memory by id, unlinking it from every index.",
            "inputSchema": {
                "type": "object",
                "properties": {"id": {"type": "string"}},
                "required": ["id"],
            },
        }),
        json!({
            "name": "memory_stats",
            "description": "Engine statistics and the active mode.",
            "inputSchema": {"type": "object", "properties": {}},
        }),
        json!({
            "name": "entity_list",
            "description": "List tracked entities.",
            "inputSchema": {"type": "object", "properties": {}},
        }),
        json!({
            "name": "graph_traverse",
            "description": "BFS subgraph around an entity.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "entity": {"type": "string"},
                    "depth": {"type": "integer"},
                },
                "required": ["entity"],
            },
        }),
        json!({
            "name": "foreshadow_add",
            "description": "Track a foreshadowing hint (narrative mode).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "importance": {"type": "number"},
                },
                "required": ["content"],
            },
        }),
        json!({
            "name": "foreshadow_list",
            "description": "List active foreshadowing hints (narrative mode).",
            "inputSchema": {"type": "object", "properties": {}},
        }),
        json!({
            "name": "foreshadow_resolve",
            "description": "Resolve a foreshadowing hint by id (narrative mode).",
            "inputSchema": {
                "type": "object",
                "properties": {"id": {"type": "string"}},
                "required": ["id"],
            },
        }),
    ]
}

#[derive(Debug, Deserialize)]
struct ScopeArgs {
    user_id: String,
    #[serde(default)]
    sub_tenant_id: Option<String>,
    session_id: String,
}

impl ScopeArgs {
    fn to_scope(&self) -> ScopeId {
        match &self.sub_tenant_id {
            Some(sub_tenant) => ScopeId::new(&self.user_id, sub_tenant, &self.session_id),
            None => ScopeId::without_sub_tenant(&self.user_id, &self.session_id),
        }
    }
}

fn text_result(text: impl Into<String>) -> Value {
    json!({"content": [{"type": "text", "text": text.into()}]})
}

fn json_result(value: &Value) -> Value {
    text_result(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
}

fn metadata_from(args: &Value) -> RecordMetadata {
    let mut metadata = RecordMetadata::default();
    metadata.source = args["source"].as_str().map(str::to_string);
    if let Some(tags) = args["tags"].as_array() {
        metadata.tags = tags
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect();
    }
    metadata.category = args["category"].as_str().map(str::to_string);
    metadata
}

/// Execute one tool call. Gated features answer with a disabled message,
/// not an error.
pub fn dispatch(engine: &MemoryEngine, name: &str, args: &Value) -> anyhow::Result<Value> {
    let scope = || -> anyhow::Result<ScopeId> {
        let parsed: ScopeArgs = serde_json::from_value(args.clone())?;
        Ok(parsed.to_scope())
    };

    let outcome = match name {
        "memory_add" => {
            let content = args["content"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("content is required"))?;
            let outcome = engine.add(content, &scope()?, metadata_from(args))?;
            json_result(&serde_json::to_value(&outcome)?)
        }
        "memory_add_batch" => {
            let items: Vec<BatchItem> = serde_json::from_value(args["items"].clone())?;
            let options = AddOptions {
                skip_dedup: args["skip_dedup"].as_bool().unwrap_or(false),
                skip_llm: args["skip_llm"].as_bool().unwrap_or(false),
            };
            let ids = engine.add_batch(items, &scope()?, options)?;
            json_result(&json!({"ids": ids}))
        }
        "memory_search" | "memory_search_filtered" => {
            let query = args["query"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("query is required"))?;
            let mut request = SearchRequest::new(query).in_scope(scope()?);
            if let Some(top_k) = args["top_k"].as_u64() {
                request = request.top_k(top_k as usize);
            }
            if name == "memory_search_filtered" {
                request.filters = MetadataFilter {
                    source: args["source"].as_str().map(str::to_string),
                    tags: args["tags"]
                        .as_array()
                        .map(|tags| {
                            tags.iter()
                                .filter_map(|t| t.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default(),
                    category: args["category"].as_str().map(str::to_string),
                    content_type: None,
                };
            }
            let hits = engine.search(&request)?;
            json_result(&serde_json::to_value(&hits)?)
        }
        "memory_context" => {
            let query = args["query"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("query is required"))?;
            let budget = args["token_budget"].as_u64().unwrap_or(2000) as usize;
            let context = engine.context(query, &scope()?, Vec::new(), budget)?;
            text_result(context)
        }
        "memory_list" => {
            let limit = args["limit"].as_u64().unwrap_or(20) as usize;
            let records = engine.list(&scope()?, limit)?;
            json_result(&serde_json::to_value(&records)?)
        }
        "memory_get" => {
            let id = args["id"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("id is required"))?;
            match engine.get(id)? {
                Some(record) => json_result(&serde_json::to_value(&record)?),
                None => text_result(format!("no memory with id {id}")),
            }
        }
        "memory_delete" => {
            let id = args["id"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("id is required"))?;
            let deleted = engine.delete(id)?;
            json_result(&json!({"deleted": deleted}))
        }
        "memory_stats" => json_result(&serde_json::to_value(engine.stats())?),
        "entity_list" => json_result(&serde_json::to_value(engine.entities())?),
        "graph_traverse" => {
            let entity = args["entity"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("entity is required"))?;
            let depth = args["depth"].as_u64().unwrap_or(2) as usize;
            match engine.traverse(entity, depth) {
                Ok((entities, edges)) => json_result(&json!({
                    "entities": entities,
                    "edges": edges,
                })),
                Err(Error::NotFound(_)) => text_result(format!("unknown entity {entity}")),
                Err(e) => return Err(e.into()),
            }
        }
        "foreshadow_add" => {
            let content = args["content"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("content is required"))?;
            let importance = args["importance"].as_f64().unwrap_or(0.5) as f32;
            match engine.foreshadow_add(content, importance, Vec::new()) {
                Ok(hint) => json_result(&serde_json::to_value(&hint)?),
                Err(Error::FeatureDisabled(message)) => text_result(message),
                Err(e) => return Err(e.into()),
            }
        }
        "foreshadow_list" => match engine.foreshadow_active() {
            Ok(hints) => json_result(&serde_json::to_value(&hints)?),
            Err(Error::FeatureDisabled(message)) => text_result(message),
            Err(e) => return Err(e.into()),
        },
        "foreshadow_resolve" => {
            let id = args["id"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("id is required"))?;
            match engine.foreshadow_resolve(id) {
                Ok(hint) => json_result(&serde_json::to_value(&hint)?),
                Err(Error::FeatureDisabled(message)) => text_result(message),
                Err(e) => return Err(e.into()),
            }
        }
        other => anyhow::bail!("unknown tool: {other}"),
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::{EngineConfig, EngineMode};

    fn engine(mode: EngineMode) -> (tempfile::TempDir, MemoryEngine) {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine =
            MemoryEngine::open(EngineConfig::new(dir.path()).with_mode(mode)).expect("open");
        (dir, engine)
    }

    #[test]
    fn add_then_search_through_tools() {
        let (_dir, engine) = engine(EngineMode::General);
        let args = json!({
            "content": "the build pipeline uses sccache",
            "user_id": "u",
            "session_id": "s",
        });
        dispatch(&engine, "memory_add", &args).expect("add");

        let result = dispatch(
            &engine,
            "memory_search",
            &json!({"query": "sccache", "user_id": "u", "session_id": "s"}),
        )
        .expect("search");
        let text = result["content"][0]["text"].as_str().expect("text");
        assert!(text.contains("sccache"));
    }

    #[test]
    fn disabled_foreshadowing_answers_with_message_not_error() {
        let (_dir, engine) = engine(EngineMode::General);
        let result = dispatch(
            &engine,
            "foreshadow_add",
            &json!({"content": "a hint"}),
        )
        .expect("dispatch succeeds");
        let text = result["content"][0]["text"].as_str().expect("text");
        assert!(text.contains("not available"));
    }

    #[test]
    fn unknown_tool_is_an_error() {
        let (_dir, engine) = engine(EngineMode::General);
        assert!(dispatch(&engine, "nonexistent_tool", &json!({})).is_err());
    }

    #[test]
    fn every_tool_is_listed_with_a_schema() {
        let definitions = tool_definitions();
        assert_eq!(definitions.len(), 14);
        for definition in &definitions {
            assert!(definition["name"].is_string());
            assert!(definition["inputSchema"].is_object());
        }
    }
}
