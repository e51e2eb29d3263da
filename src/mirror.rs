//! Local typed shadows of remote property sets.

use std::{
    fmt,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    variant::{PropMap, Variant},
    Result,
};

/// A typed record whose fields correspond one-for-one to the properties of a remote interface.
///
/// Implementations are generated by the `define_interface!` macro from a property schema.
pub trait Properties: Default + Clone + fmt::Debug + Send + Sync + 'static {
    /// The D-Bus interface the record mirrors.
    const INTERFACE: &'static str;

    /// Declared property names, in declaration order.
    const NAMES: &'static [&'static str];

    /// Decodes a bag of property values into a fresh record.
    ///
    /// Unknown keys are ignored and missing keys keep their default value. A value whose type
    /// does not match the declared type of its property fails with an error naming the property.
    fn from_variant_map(map: &PropMap) -> Result<Self>;

    /// Assigns a single property.
    ///
    /// Returns `Ok(false)` if `name` is not a declared property, and an error if the value's type
    /// does not match. In both cases the record is left untouched.
    fn apply_change(&mut self, name: &str, value: &Variant) -> Result<bool>;

    /// Produces a snapshot mapping every declared property name to its current value.
    fn to_map(&self) -> PropMap;
}

/// How a change was handled by [`Mirror::apply_change`].
#[derive(Debug)]
pub enum Applied {
    Updated,
    UnknownProperty,
    /// The value was not assignable to the property's declared type.
    Rejected(crate::Error),
}

/// A [`Properties`] record behind a single-writer/multi-reader lock.
///
/// Bulk fills and per-field updates take the writer end of the same lock and are therefore
/// serialized against each other and against readers.
#[derive(Default)]
pub struct Mirror<P> {
    record: RwLock<P>,
}

impl<P: Properties> Mirror<P> {
    pub fn new(record: P) -> Self {
        Self {
            record: RwLock::new(record),
        }
    }

    /// Acquires the reader end of the lock.
    ///
    /// The returned guard must not be held across an `.await`, or change reconciliation for this
    /// object stalls until it is dropped.
    pub fn read(&self) -> RwLockReadGuard<'_, P> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the writer end of the lock.
    ///
    /// Holding it blocks readers as well as change reconciliation.
    pub fn lock(&self) -> RwLockWriteGuard<'_, P> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the current record.
    pub fn snapshot(&self) -> P {
        self.read().clone()
    }

    pub fn to_map(&self) -> PropMap {
        self.read().to_map()
    }

    /// Replaces the whole record with the decoded contents of `map`.
    ///
    /// Decoding happens before the lock is taken; on error the record is not modified.
    pub fn fill(&self, map: &PropMap) -> Result<()> {
        let record = P::from_variant_map(map)?;
        *self.lock() = record;
        Ok(())
    }

    /// Updates a single property under the writer lock.
    pub fn apply_change(&self, name: &str, value: &Variant) -> Applied {
        match self.lock().apply_change(name, value) {
            Ok(true) => Applied::Updated,
            Ok(false) => Applied::UnknownProperty,
            Err(e) => Applied::Rejected(e),
        }
    }
}

impl<P: Properties> fmt::Debug for Mirror<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mirror").field(&*self.read()).finish()
    }
}
