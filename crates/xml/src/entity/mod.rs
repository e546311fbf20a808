//! Entity stack and external-entity resolution.
//!
//! The active `ParsingState` lives in the tokenizer; this stack holds the
//! suspended parents. Pushing an entity suspends the active state and makes
//! the entity's state active; popping restores the parent. Expansion is
//! strictly nested, so an entity is "open" exactly when its id appears on
//! the stack or in the active state.

use std::mem;

use crate::input::ParsingState;

mod resolver;

pub use resolver::{
    FileResolver, MemoryResolver, NullResolver, ResolvedEntity, XmlResolver, resolve_uri,
};

#[derive(Default)]
pub(crate) struct EntityStack {
    saved: Vec<ParsingState>,
}

impl EntityStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of entities being expanded.
    pub(crate) fn depth(&self) -> usize {
        self.saved.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    pub(crate) fn push(&mut self, active: &mut ParsingState, entity: ParsingState) {
        let parent = mem::replace(active, entity);
        self.saved.push(parent);
    }

    /// Restore the parent state and return the finished entity state.
    pub(crate) fn pop(&mut self, active: &mut ParsingState) -> Option<ParsingState> {
        let parent = self.saved.pop()?;
        Some(mem::replace(active, parent))
    }

    /// Whether entity `id` is being expanded anywhere on the stack.
    pub(crate) fn is_open(&self, active: &ParsingState, id: u32) -> bool {
        id != 0 && (active.entity_id == id || self.saved.iter().any(|ps| ps.entity_id == id))
    }

    /// The state reading the document itself.
    pub(crate) fn document_state<'s>(
        &'s mut self,
        active: &'s mut ParsingState,
    ) -> &'s mut ParsingState {
        match self.saved.first_mut() {
            Some(document) => document,
            None => active,
        }
    }

    pub(crate) fn document_state_ref<'s>(&'s self, active: &'s ParsingState) -> &'s ParsingState {
        self.saved.first().unwrap_or(active)
    }

    /// Drop every entity state, leaving the document state active.
    pub(crate) fn unwind(&mut self, active: &mut ParsingState) {
        if let Some(document) = self.saved.drain(..).next() {
            *active = document;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputSource;

    fn state(text: &str, id: u32) -> ParsingState {
        let mut ps = ParsingState::for_entity_text(text.to_string(), 16, None);
        ps.entity_id = id;
        ps
    }

    #[test]
    fn push_and_pop_nest() {
        let mut stack = EntityStack::new();
        let mut active = ParsingState::new(InputSource::from("<doc/>"), 16, None);
        stack.push(&mut active, state("a", 1));
        stack.push(&mut active, state("b", 2));
        assert_eq!(stack.depth(), 2);
        assert!(stack.is_open(&active, 1));
        assert!(stack.is_open(&active, 2));
        assert!(!stack.is_open(&active, 3));
        assert!(!stack.is_open(&active, 0));

        let finished = stack.pop(&mut active).unwrap();
        assert_eq!(finished.entity_id, 2);
        assert_eq!(active.entity_id, 1);
        assert_eq!(stack.document_state_ref(&active).entity_id, 0);
        stack.pop(&mut active).unwrap();
        assert!(stack.pop(&mut active).is_none());
        assert_eq!(active.entity_id, 0);
    }

    #[test]
    fn unwind_restores_document() {
        let mut stack = EntityStack::new();
        let mut active = ParsingState::new(InputSource::from("<doc/>"), 16, None);
        stack.push(&mut active, state("a", 1));
        stack.push(&mut active, state("b", 2));
        stack.document_state(&mut active).is_eof = true;
        stack.unwind(&mut active);
        assert!(stack.is_empty());
        assert_eq!(active.entity_id, 0);
        assert!(active.is_eof);
    }
}
