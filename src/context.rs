//! Cache-aware system prompt assembly.
//!
//! The system prompt is an ordered block sequence: static prefix, rules,
//! tool descriptions, memory, then dynamic content. The first four carry
//! cache markers — "the prefix up to here is a stable cache key" — so a
//! provider prompt cache pays only for the dynamic suffix on long
//! sessions. Nothing time- or session-varying may land in a marked block.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{canonical_json, ContentBlock};

#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    static_prefix: String,
    rules:         String,
    tools:         String,
    memory:        String,
    dynamic:       String,
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The frozen session-wide prefix, typically served from
    /// `SharedContextState::static_prefix` so every worker aligns on the
    /// same cacheable head.
    pub fn static_prefix(mut self, text: impl Into<String>) -> Self {
        self.static_prefix = text.into();
        self
    }

    pub fn rules(mut self, text: impl Into<String>) -> Self {
        self.rules = text.into();
        self
    }

    /// Tool section from provider declarations. Serialisation is
    /// canonical (sorted keys), so an unchanged tool set renders to
    /// identical bytes every iteration.
    pub fn tools_from_declarations(mut self, declarations: &[Value]) -> Self {
        if declarations.is_empty() {
            self.tools = String::new();
            return self;
        }
        let rendered: Vec<String> = declarations.iter().map(canonical_json).collect();
        self.tools = format!("Available tools:\n{}", rendered.join("\n"));
        self
    }

    pub fn tools(mut self, text: impl Into<String>) -> Self {
        self.tools = text.into();
        self
    }

    pub fn memory(mut self, text: impl Into<String>) -> Self {
        self.memory = text.into();
        self
    }

    /// Dynamic suffix: timestamps, counters, per-iteration guidance. The
    /// only section allowed to vary between iterations.
    pub fn dynamic(mut self, text: impl Into<String>) -> Self {
        self.dynamic = text.into();
        self
    }

    /// Produce the block sequence. Empty sections contribute no block and
    /// no marker; assembling the same inputs always produces the same
    /// sequence.
    pub fn assemble(&self) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        for section in [&self.static_prefix, &self.rules, &self.tools, &self.memory] {
            if !section.is_empty() {
                blocks.push(ContentBlock::cacheable(section.clone()));
            }
        }
        if !self.dynamic.is_empty() {
            blocks.push(ContentBlock::plain(self.dynamic.clone()));
        }
        blocks
    }
}

/// SHA-256 over the marked prefix of a block sequence, as lowercase hex.
/// Two assemblies with the same cacheable head produce the same key.
pub fn cache_key(blocks: &[ContentBlock]) -> String {
    let mut hasher = Sha256::new();
    for block in blocks.iter().take_while(|b| b.cache_marker) {
        hasher.update(block.text.as_bytes());
        hasher.update([0u8]); // block boundary
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
