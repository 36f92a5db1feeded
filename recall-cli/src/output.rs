//! Output formatting: human text or JSON.

use recall_core::{AddOutcome, EngineStats, Foreshadowing, MemoryRecord, SearchHit};
use serde::Serialize;

/// Selected output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_add(format: Format, outcome: &AddOutcome) -> anyhow::Result<()> {
    match format {
        Format::Json => print_json(outcome),
        Format::Text => {
            if outcome.accepted {
                println!("stored {}", outcome.id);
            } else {
                println!("duplicate of {}", outcome.id);
            }
            if !outcome.entities.is_empty() {
                println!("entities: {}", outcome.entities.join(", "));
            }
            for warning in &outcome.warnings {
                println!("warning: {warning}");
            }
            Ok(())
        }
    }
}

pub fn print_hits(format: Format, hits: &[SearchHit]) -> anyhow::Result<()> {
    match format {
        Format::Json => print_json(&hits),
        Format::Text => {
            if hits.is_empty() {
                println!("no results");
                return Ok(());
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{:>2}. [{:.4}] {} ({})",
                    i + 1,
                    hit.score,
                    hit.content,
                    hit.paths.join("+")
                );
            }
            Ok(())
        }
    }
}

pub fn print_records(format: Format, records: &[MemoryRecord]) -> anyhow::Result<()> {
    match format {
        Format::Json => print_json(&records),
        Format::Text => {
            for record in records {
                println!(
                    "{}  {}  {}",
                    record.timestamp.format("%Y-%m-%d %H:%M"),
                    record.id,
                    record.content
                );
            }
            Ok(())
        }
    }
}

pub fn print_stats(format: Format, stats: &EngineStats) -> anyhow::Result<()> {
    match format {
        Format::Json => print_json(stats),
        Format::Text => {
            println!("mode:                {}", stats.mode);
            println!("records (live/all):  {}/{}", stats.live_records, stats.total_records);
            println!("scopes:              {}", stats.scope_count);
            println!("entities:            {}", stats.entity_count);
            println!("graph edges:         {}", stats.edge_count);
            println!("keyword tokens:      {}", stats.keyword_tokens);
            if let Some(vectors) = stats.vector_entries {
                println!("vector entries:      {vectors}");
            }
            println!("open contradictions: {}", stats.open_contradictions);
            if let Some(active) = stats.active_foreshadowing {
                println!("active hints:        {active}");
            }
            Ok(())
        }
    }
}

pub fn print_hints(format: Format, hints: &[Foreshadowing]) -> anyhow::Result<()> {
    match format {
        Format::Json => print_json(&hints),
        Format::Text => {
            if hints.is_empty() {
                println!("no active hints");
                return Ok(());
            }
            for hint in hints {
                println!("[{:.1}] {}  {}", hint.importance, hint.id, hint.content);
            }
            Ok(())
        }
    }
}
