//! Nested collections that report their own structural changes.
//!
//! Every mutation of an [`ObservableVec`] returns a [`CollectionChange`]
//! stamped with the collection's [`CollectionId`]. Nothing is delivered
//! implicitly: the owner hands the change to whoever listens (the client's
//! collection bridge) as an explicit publish step. A collection that is
//! replaced wholesale gets a new id, which is how listeners tell a live
//! instance from a detached one.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use strum::Display;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionId(Uuid);

impl CollectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Replaced,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionChange {
    pub collection: CollectionId,
    pub kind: ChangeKind,
    /// Position touched by the change; `None` for a reset.
    pub index: Option<usize>,
}

/// An ordered collection with a stable instance identity.
///
/// Read access goes through `Deref<Target = [T]>`; there is deliberately no
/// `DerefMut`, so every write produces a change record.
#[derive(Debug)]
pub struct ObservableVec<T> {
    id: CollectionId,
    items: Vec<T>,
}

impl<T> ObservableVec<T> {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn push(&mut self, item: T) -> CollectionChange {
        self.items.push(item);
        self.change(ChangeKind::Added, Some(self.items.len() - 1))
    }

    pub fn remove(&mut self, index: usize) -> Option<(T, CollectionChange)> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.remove(index);
        Some((item, self.change(ChangeKind::Removed, Some(index))))
    }

    /// Mutate one item in place.
    pub fn update<F>(&mut self, index: usize, f: F) -> Option<CollectionChange>
    where
        F: FnOnce(&mut T),
    {
        let item = self.items.get_mut(index)?;
        f(item);
        Some(self.change(ChangeKind::Replaced, Some(index)))
    }

    fn change(&self, kind: ChangeKind, index: Option<usize>) -> CollectionChange {
        CollectionChange {
            collection: self.id,
            kind,
            index,
        }
    }
}

impl<T> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for ObservableVec<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            id: CollectionId::generate(),
            items,
        }
    }
}

impl<T> FromIterator<T> for ObservableVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

/// A copy is a separate instance: same items, fresh id.
impl<T: Clone> Clone for ObservableVec<T> {
    fn clone(&self) -> Self {
        Self::from(self.items.clone())
    }
}

impl<T: PartialEq> PartialEq for ObservableVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T> Deref for ObservableVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a ObservableVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for ObservableVec<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ObservableVec<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<T>::deserialize(deserializer).map(Self::from)
    }
}
