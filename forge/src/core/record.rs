//! The canonical record store: one entry per dialogue, indexed by position.

use serde::{Deserialize, Serialize};

/// Who produced a turn. Serialized with the executor's chat role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    Initiator,
    #[serde(rename = "assistant")]
    Responder,
}

impl Role {
    pub fn wire_name(self) -> &'static str {
        match self {
            Role::Initiator => "user",
            Role::Responder => "assistant",
        }
    }
}

/// One dialogue turn. Insertion order is chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// One dialogue tracked across rounds.
///
/// `source` and `scene` are the narrative provenance, set once when the
/// store is created from a seed batch and immutable thereafter. `models`
/// parallels `dialogue`: entry *i* names the model that produced turn *i*.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub source: String,
    pub scene: String,
    pub lang: String,
    pub dialogue: Vec<Turn>,
    pub models: Vec<String>,
    pub ended: bool,
}

impl Record {
    /// Append a turn and the model that produced it.
    pub fn append_turn(&mut self, role: Role, content: String, model: &str) {
        self.dialogue.push(Turn { role, content });
        self.models.push(model.to_string());
    }

    /// Render the dialogue as `role: content` lines.
    ///
    /// With `strip_newlines`, newlines inside turn content are removed so
    /// each turn occupies exactly one transcript line.
    pub fn transcript(&self, strip_newlines: bool) -> String {
        self.dialogue
            .iter()
            .map(|turn| {
                let content = if strip_newlines {
                    turn.content.replace('\n', "")
                } else {
                    turn.content.clone()
                };
                format!("{}: {}", turn.role.wire_name(), content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Ordered, index-addressable collection of records.
///
/// The index of a record is its identity: correlation ids encode it, and
/// merges are keyed by it. Records are never removed or reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn ended_count(&self) -> usize {
        self.records.iter().filter(|r| r.ended).count()
    }
}
