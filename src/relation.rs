//! Associations between entities.
//!
//! An [`Association`] is the query side of a relationship: a path field such as
//! `member.team` that joins can follow. A [`Reference`] is the entity side: the
//! identity of the associated row plus, once materialized, the row itself.
//!
//! References never load implicitly. A fetch join fills them while the owning
//! row is decoded; otherwise [`Reference::get`] issues a by-id query on first
//! access. [`Reference::is_loaded`] inspects the state without loading.

use crate::error::QueryError;
use crate::executor::QueryExecutor;
use crate::query::select::select_from;
use crate::schema::{AssociationDef, Entity, EntityPath};
use once_cell::unsync::OnceCell;
use std::fmt;
use std::marker::PhantomData;

/// Association field of a query path, e.g. `QMember::team`
pub struct Association<T> {
    owner_alias: String,
    def: &'static AssociationDef,
    _target: PhantomData<fn() -> T>,
}

impl<T> Clone for Association<T> {
    fn clone(&self) -> Self {
        Self {
            owner_alias: self.owner_alias.clone(),
            def: self.def,
            _target: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Association<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Association({}.{})", self.owner_alias, self.def.name)
    }
}

impl<T: Entity> Association<T> {
    pub fn new(owner_alias: &str, def: &'static AssociationDef) -> Self {
        Self {
            owner_alias: owner_alias.to_string(),
            def,
            _target: PhantomData,
        }
    }

    pub fn owner_alias(&self) -> &str {
        &self.owner_alias
    }

    pub fn def(&self) -> &'static AssociationDef {
        self.def
    }
}

/// A to-one reference that may or may not be materialized
pub struct Reference<T> {
    id: Option<i64>,
    entity: OnceCell<T>,
}

impl<T: Clone> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            entity: self.entity.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("id", &self.id)
            .field("loaded", &self.entity.get().is_some())
            .finish()
    }
}

impl<T> Default for Reference<T> {
    fn default() -> Self {
        Self {
            id: None,
            entity: OnceCell::new(),
        }
    }
}

impl<T: Entity> Reference<T> {
    /// Unmaterialized reference to the row with `id`
    pub fn new(id: Option<i64>) -> Self {
        Self {
            id,
            entity: OnceCell::new(),
        }
    }

    /// Materialized reference to an already known entity
    pub fn loaded(entity: T) -> Self {
        Self {
            id: entity.id(),
            entity: OnceCell::with_value(entity),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Whether the target has been materialized; never triggers a load
    pub fn is_loaded(&self) -> bool {
        self.entity.get().is_some()
    }

    /// The target if already materialized
    pub fn peek(&self) -> Option<&T> {
        self.entity.get()
    }

    pub(crate) fn set_loaded(&mut self, entity: T) {
        self.id = entity.id();
        self.entity = OnceCell::with_value(entity);
    }

    /// Return the target, loading it by identity on first access.
    ///
    /// `Ok(None)` when the reference is empty. A dangling identity fails with
    /// `QueryError::NotFound`.
    pub fn get<E: QueryExecutor + ?Sized>(&self, executor: &E) -> Result<Option<&T>, QueryError> {
        let Some(id) = self.id else {
            return Ok(None);
        };
        self.entity
            .get_or_try_init(|| {
                let path = T::Path::new(T::schema().table);
                log::trace!("loading {} {id} lazily", T::schema().table);
                select_from(&path)
                    .filter(path.identity().eq(id))
                    .fetch_one(executor)
            })
            .map(Some)
    }
}
