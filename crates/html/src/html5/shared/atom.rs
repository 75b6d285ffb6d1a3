//! Atom table for canonicalized HTML tag/attribute names.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque atom identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub u32);

/// Document-level atom table.
///
/// Invariant: ASCII letters are stored in canonical lowercase form for
/// HTML-namespace matching. Non-ASCII code points are preserved as-is.
/// Case-sensitive names (adjusted SVG tag/attribute names) are interned
/// through [`AtomTable::intern_exact`] and bypass the folding rule.
#[derive(Debug)]
pub struct AtomTable {
    id: u64,
    atoms: Vec<Arc<str>>,
    map: HashMap<Arc<str>, AtomId>,
}

impl AtomTable {
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            atoms: Vec::new(),
            map: HashMap::new(),
        }
    }

    /// Intern a name, applying ASCII-lowercase folding for HTML matching.
    pub fn intern_ascii_folded(&mut self, name: &str) -> Result<AtomId, AtomError> {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            let folded = name.to_ascii_lowercase();
            self.intern_exact(&folded)
        } else {
            self.intern_exact(name)
        }
    }

    /// Intern a name exactly as given (no case folding).
    ///
    /// Used for case-adjusted foreign names such as `foreignObject`, which
    /// must not collide with their all-lowercase HTML spellings.
    pub fn intern_exact(&mut self, name: &str) -> Result<AtomId, AtomError> {
        if let Some(id) = self.map.get(name) {
            return Ok(*id);
        }
        let idx: u32 = self
            .atoms
            .len()
            .try_into()
            .map_err(|_| AtomError::OutOfIds)?;
        let atom = Arc::<str>::from(name);
        let id = AtomId(idx);
        self.atoms.push(Arc::clone(&atom));
        let _ = self.map.insert(atom, id);
        Ok(id)
    }

    /// Look up an already-interned name without inserting.
    pub fn get(&self, name: &str) -> Option<AtomId> {
        self.map.get(name).copied()
    }

    pub fn resolve(&self, id: AtomId) -> Option<&str> {
        self.atoms.get(id.0 as usize).map(|s| s.as_ref())
    }

    /// Resolve an atom id to a cloned canonical `Arc<str>`.
    ///
    /// This enables zero-reallocation reuse of interned names in downstream
    /// structures (stack items, sink calls).
    pub fn resolve_arc(&self, id: AtomId) -> Option<Arc<str>> {
        self.atoms.get(id.0 as usize).cloned()
    }

    /// Stable per-instance identifier used to enforce document-level binding
    /// invariants between a builder and the table it was created against.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtomError {
    OutOfIds,
}
