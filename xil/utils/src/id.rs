//! Globally interned identifiers.
use lazy_static::lazy_static;
use std::{cmp::Ordering, fmt, sync::Mutex};
use string_interner::{
    StringInterner, backend::BucketBackend, symbol::SymbolU32,
};

type Pool = StringInterner<BucketBackend>;

lazy_static! {
    static ref POOL: Mutex<Pool> = Mutex::new(Pool::new());
}

/// A globally interned symbol.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct GSym(SymbolU32);

impl GSym {
    /// Intern a string into the global symbol table.
    pub fn new(s: impl AsRef<str>) -> Self {
        let mut pool = POOL.lock().unwrap_or_else(|p| p.into_inner());
        GSym(pool.get_or_intern(s.as_ref()))
    }

    /// Convert this symbol into the string in the static, global symbol table.
    pub fn as_str(&self) -> &'static str {
        let pool = POOL.lock().unwrap_or_else(|p| p.into_inner());
        let s = pool.resolve(self.0).unwrap_or_default();
        // SAFETY: the bucket backend never moves or frees an interned string
        // and the pool lives for the rest of the program.
        unsafe { &*(s as *const str) }
    }
}

impl fmt::Debug for GSym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for GSym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_str(), f)
    }
}

/// Represents an identifier: a function, variable, port, or signal name.
///
/// Identifiers are ordered by their text so that sorting them never depends on
/// the order in which they were interned.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id {
    pub id: GSym,
}

impl Id {
    pub fn new<S: ToString>(id: S) -> Self {
        Self {
            id: GSym::new(id.to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.id.as_str()
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.id == other.id {
            Ordering::Equal
        } else {
            self.as_str().cmp(other.as_str())
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.id, f)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::new(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::new(s)
    }
}

impl From<&String> for Id {
    fn from(s: &String) -> Self {
        Id::new(s)
    }
}

impl PartialEq<str> for Id {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// A trait representing something that has a name.
pub trait GetName {
    fn name(&self) -> Id;
}
