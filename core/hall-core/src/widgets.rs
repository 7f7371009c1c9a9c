//! Widget slot bookkeeping.
//!
//! A slot kind (`default`, `media`, ...) is bound to a widget id in three
//! steps: an id is allocated, the user picks a widget, then configures it.
//! Cancelling either step deletes the id. Binding a kind again replaces the
//! old widget.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetStage {
    AwaitingPick,
    AwaitingConfigure,
    Bound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetEntry {
    pub kind: String,
    pub stage: WidgetStage,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WidgetError {
    #[error("Unknown widget id: {0}")]
    UnknownId(u32),

    #[error("Widget {id} is not awaiting {expected:?}")]
    WrongStage { id: u32, expected: WidgetStage },
}

#[derive(Debug, Default)]
pub struct WidgetRegistry {
    next_id: u32,
    entries: BTreeMap<u32, WidgetEntry>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id for `kind` and waits for the pick result.
    pub fn register(&mut self, kind: &str) -> u32 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert(
            id,
            WidgetEntry {
                kind: kind.to_string(),
                stage: WidgetStage::AwaitingPick,
            },
        );
        id
    }

    pub fn picked(&mut self, id: u32, ok: bool) -> Result<(), WidgetError> {
        self.advance(id, ok, WidgetStage::AwaitingPick, WidgetStage::AwaitingConfigure)
    }

    pub fn configured(&mut self, id: u32, ok: bool) -> Result<(), WidgetError> {
        self.advance(id, ok, WidgetStage::AwaitingConfigure, WidgetStage::Bound)?;
        if ok {
            let kind = self.entries.get(&id).map(|entry| entry.kind.clone());
            if let Some(kind) = kind {
                self.entries.retain(|other_id, entry| {
                    *other_id == id || !(entry.kind == kind && entry.stage == WidgetStage::Bound)
                });
            }
        }
        Ok(())
    }

    /// Drops the widget bound to `kind`, returning its id.
    pub fn unregister(&mut self, kind: &str) -> Option<u32> {
        let id = self.bound_id(kind)?;
        self.entries.remove(&id);
        Some(id)
    }

    pub fn is_enabled(&self, kind: &str) -> bool {
        self.bound_id(kind).is_some()
    }

    /// Bound widgets by kind.
    pub fn bindings(&self) -> BTreeMap<String, u32> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.stage == WidgetStage::Bound)
            .map(|(id, entry)| (entry.kind.clone(), *id))
            .collect()
    }

    fn bound_id(&self, kind: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.kind == kind && entry.stage == WidgetStage::Bound)
            .map(|(id, _)| *id)
    }

    fn advance(
        &mut self,
        id: u32,
        ok: bool,
        expected: WidgetStage,
        next: WidgetStage,
    ) -> Result<(), WidgetError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(WidgetError::UnknownId(id))?;
        if entry.stage != expected {
            return Err(WidgetError::WrongStage { id, expected });
        }

        if ok {
            entry.stage = next;
        } else {
            tracing::debug!(id, kind = %entry.kind, "Widget setup cancelled; deleting id");
            self.entries.remove(&id);
        }
        Ok(())
    }
}
