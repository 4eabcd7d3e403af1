//! Per-point attribute storage
//!
//! A [`PropertyContainer`] holds any number of named attribute arrays of
//! different element types behind a type-erased slot table. Typed access goes
//! through a [`PropertyHandle`], which remembers the slot generation so that a
//! handle outliving its property is rejected instead of aliasing whatever
//! property later reuses the slot.

use crate::error::{Error, Result};
use crate::point::{Point3f, Point3ub};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::Location;

/// Element type of a per-point attribute array
pub trait PropertyValue: Clone + Default + Send + Sync + 'static {}

impl<T> PropertyValue for T where T: Clone + Default + Send + Sync + 'static {}

/// A well-known attribute with a fixed name and value type
pub trait StandardProperty {
    type Value: PropertyValue;
    const NAME: &'static str;
}

/// Unit surface normal per point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normals;

/// Sensor return intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intensity;

/// Sensor measurement confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confidence;

/// 8-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb;

impl StandardProperty for Normals {
    type Value = Point3f;
    const NAME: &'static str = "normals";
}

impl StandardProperty for Intensity {
    type Value = u16;
    const NAME: &'static str = "intensity";
}

impl StandardProperty for Confidence {
    type Value = u16;
    const NAME: &'static str = "confidence";
}

impl StandardProperty for Rgb {
    type Value = Point3ub;
    const NAME: &'static str = "rgb";
}

/// A named attribute array
#[derive(Debug, Clone)]
pub struct Property<T> {
    name: String,
    data: Vec<T>,
}

impl<T: PropertyValue> Property<T> {
    pub fn new(name: &str, data: Vec<T>) -> Self {
        Self {
            name: name.to_owned(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

trait AnyProperty: Send + Sync {
    fn name(&self) -> &str;
    fn len(&self) -> usize;
    fn resize(&mut self, n: usize);
    fn clone_box(&self) -> Box<dyn AnyProperty>;
    fn select(&self, keep: &[bool]) -> Box<dyn AnyProperty>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: PropertyValue> AnyProperty for Property<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn resize(&mut self, n: usize) {
        self.data.resize(n, T::default());
    }

    fn clone_box(&self) -> Box<dyn AnyProperty> {
        Box::new(self.clone())
    }

    fn select(&self, keep: &[bool]) -> Box<dyn AnyProperty> {
        let data = self
            .data
            .iter()
            .zip(keep)
            .filter(|(_, &k)| k)
            .map(|(v, _)| v.clone())
            .collect();
        Box::new(Property {
            name: self.name.clone(),
            data,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Typed reference to a property slot
pub struct PropertyHandle<T> {
    slot: usize,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PropertyHandle<T> {
    fn new(slot: usize, generation: u32) -> Self {
        Self {
            slot,
            generation,
            _marker: PhantomData,
        }
    }

    /// A handle that never refers to a property
    pub fn invalid() -> Self {
        Self::new(usize::MAX, 0)
    }

    /// Whether the handle was ever bound to a slot.
    ///
    /// A bound handle can still be stale; only the owning container can tell.
    pub fn is_valid(&self) -> bool {
        self.slot != usize::MAX
    }

    pub fn index(&self) -> Option<usize> {
        self.is_valid().then_some(self.slot)
    }

    pub fn reset(&mut self) {
        *self = Self::invalid();
    }
}

impl<T> Clone for PropertyHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PropertyHandle<T> {}

impl<T> PartialEq for PropertyHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for PropertyHandle<T> {}

impl<T> Default for PropertyHandle<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> fmt::Debug for PropertyHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyHandle")
            .field("slot", &self.index())
            .field("generation", &self.generation)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

struct Slot {
    generation: u32,
    property: Option<Box<dyn AnyProperty>>,
}

impl Clone for Slot {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            property: self.property.as_ref().map(|p| p.clone_box()),
        }
    }
}

/// Sparse table of attribute arrays; removed slots are tombstoned and reused
#[derive(Clone, Default)]
pub struct PropertyContainer {
    slots: Vec<Slot>,
}

#[track_caller]
fn invalid_handle() -> Error {
    Error::Contract {
        message: "invalid property handle".to_string(),
        location: Location::caller(),
    }
}

impl PropertyContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `name`, reusing the first tombstoned slot if any
    pub fn add<T: PropertyValue>(&mut self, name: &str, data: Vec<T>) -> PropertyHandle<T> {
        let property: Box<dyn AnyProperty> = Box::new(Property::new(name, data));

        match self.slots.iter().position(|s| s.property.is_none()) {
            Some(slot) => {
                self.slots[slot].property = Some(property);
                PropertyHandle::new(slot, self.slots[slot].generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    property: Some(property),
                });
                PropertyHandle::new(self.slots.len() - 1, 0)
            }
        }
    }

    /// Whether `handle` refers to a live property of type `T`
    pub fn contains<T: PropertyValue>(&self, handle: PropertyHandle<T>) -> bool {
        self.lookup(handle).is_some()
    }

    fn lookup<T: PropertyValue>(&self, handle: PropertyHandle<T>) -> Option<&Property<T>> {
        self.slots
            .get(handle.slot)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.property.as_deref())
            .and_then(|p| p.as_any().downcast_ref::<Property<T>>())
    }

    #[track_caller]
    pub fn get<T: PropertyValue>(&self, handle: PropertyHandle<T>) -> Result<&Property<T>> {
        match self.lookup(handle) {
            Some(p) => Ok(p),
            None => Err(invalid_handle()),
        }
    }

    #[track_caller]
    pub fn get_mut<T: PropertyValue>(
        &mut self,
        handle: PropertyHandle<T>,
    ) -> Result<&mut Property<T>> {
        let property = self
            .slots
            .get_mut(handle.slot)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.property.as_deref_mut())
            .and_then(|p| p.as_any_mut().downcast_mut::<Property<T>>());

        match property {
            Some(p) => Ok(p),
            None => Err(invalid_handle()),
        }
    }

    /// Handle of the first property called `name` holding `T`, or an invalid handle
    pub fn handle<T: PropertyValue>(&self, name: &str) -> PropertyHandle<T> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| {
                s.property
                    .as_deref()
                    .is_some_and(|p| p.name() == name && p.as_any().is::<Property<T>>())
            })
            .map(|(i, s)| PropertyHandle::new(i, s.generation))
            .unwrap_or_default()
    }

    /// Tombstone the slot `handle` refers to; every copy of the handle goes stale
    #[track_caller]
    pub fn remove<T: PropertyValue>(&mut self, handle: PropertyHandle<T>) -> Result<()> {
        if !self.contains(handle) {
            return Err(invalid_handle());
        }
        let slot = &mut self.slots[handle.slot];
        slot.property = None;
        slot.generation = slot.generation.wrapping_add(1);
        Ok(())
    }

    /// Resize every live property to `n` elements
    pub fn resize(&mut self, n: usize) {
        for p in self.slots.iter_mut().filter_map(|s| s.property.as_deref_mut()) {
            p.resize(n);
        }
    }

    /// Drop every property; outstanding handles go stale
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.property.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
    }

    /// Number of live properties
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.property.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the live properties in slot order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots
            .iter()
            .filter_map(|s| s.property.as_deref())
            .map(|p| p.name())
    }

    /// Whether every live property holds exactly `n` elements
    pub fn all_sized(&self, n: usize) -> bool {
        self.slots
            .iter()
            .filter_map(|s| s.property.as_deref())
            .all(|p| p.len() == n)
    }

    /// Copy of the container keeping only the elements whose `keep` flag is set.
    ///
    /// Slot layout and generations are preserved, so handles taken from `self`
    /// stay usable on the result.
    pub(crate) fn select(&self, keep: &[bool]) -> Self {
        let slots = self
            .slots
            .iter()
            .map(|s| Slot {
                generation: s.generation,
                property: s.property.as_deref().map(|p| p.select(keep)),
            })
            .collect();
        Self { slots }
    }
}

impl fmt::Debug for PropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
