//! Worker-owned person storage.
//!
//! Confluxes refer to persons only by `PersonId`; the worker that owns a
//! conflux owns the `Person` values of everyone that conflux contains.  A
//! person changing worker is removed here and travels inside a message.

use rustc_hash::FxHashMap;

use meso_core::PersonId;

use crate::Person;

#[derive(Debug, Default)]
pub struct PersonRegistry {
    persons: FxHashMap<PersonId, Person>,
}

impl PersonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a person, returning any previous entry with the same ID.
    pub fn insert(&mut self, person: Person) -> Option<Person> {
        self.persons.insert(person.id, person)
    }

    #[inline]
    pub fn get(&self, id: PersonId) -> Option<&Person> {
        self.persons.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: PersonId) -> Option<&mut Person> {
        self.persons.get_mut(&id)
    }

    pub fn remove(&mut self, id: PersonId) -> Option<Person> {
        self.persons.remove(&id)
    }

    pub fn contains(&self, id: PersonId) -> bool {
        self.persons.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    /// All IDs in ascending order.
    pub fn ids(&self) -> Vec<PersonId> {
        let mut ids: Vec<PersonId> = self.persons.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate in arbitrary order.  Sort before anything order-sensitive.
    pub fn iter(&self) -> impl Iterator<Item = &Person> {
        self.persons.values()
    }
}
