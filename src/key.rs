//! Service identifiers.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a registered service.
///
/// Equality is identity-based: `Type` keys compare by `TypeId`, `Token` keys by
/// a process-unique number. Display names never take part in equality, so two
/// unrelated tokens called `"Logger"` do not collide.
///
/// # Examples
///
/// ```rust
/// use tiered_di::{Key, key_of_type};
///
/// let a = Key::token("Logger");
/// let b = Key::token("Logger");
/// assert_ne!(a, b);
/// assert_eq!(a.display_name(), b.display_name());
///
/// assert_eq!(key_of_type::<String>(), key_of_type::<String>());
/// ```
#[derive(Clone, Copy)]
pub enum Key {
    /// Identity derived from the service type
    Type(TypeId, &'static str),
    /// Explicitly minted token with a display name for diagnostics
    Token(u64, &'static str),
}

impl Key {
    /// Mints a new token key. Every call returns a key unequal to all others.
    pub fn token(name: &'static str) -> Self {
        Key::Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed), name)
    }

    /// Get the display name used in errors and logs.
    pub fn display_name(&self) -> &'static str {
        match self {
            Key::Type(_, name) | Key::Token(_, name) => name,
        }
    }
}

impl PartialEq for Key {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Type(a, _), Key::Type(b, _)) => a == b,
            (Key::Token(a, _), Key::Token(b, _)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            Key::Token(id, _) => {
                1u8.hash(state);
                id.hash(state);
            }
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Type(_, name) => write!(f, "Type({name})"),
            Key::Token(id, name) => write!(f, "Token({name}#{id})"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[inline]
pub fn key_of_type<T: 'static>() -> Key {
    Key::Type(TypeId::of::<T>(), std::any::type_name::<T>())
}

/// Typed handle for a service identifier.
///
/// Ties a [`Key`] to the Rust type the service resolves to, so registration
/// and resolution are checked at compile time.
///
/// ```rust
/// use tiered_di::{Resolver, ServiceKey, ServiceProvider};
///
/// struct Greeting(&'static str);
///
/// let formal = ServiceKey::<Greeting>::token("formal");
/// let casual = ServiceKey::<Greeting>::token("casual");
///
/// let provider = ServiceProvider::new();
/// provider.register_instance(&formal, Greeting("Good evening")).unwrap();
/// provider.register_instance(&casual, Greeting("Hey")).unwrap();
///
/// let root = provider.root_scope().unwrap();
/// assert_eq!(root.get_keyed(&formal).unwrap().0, "Good evening");
/// assert_eq!(root.get_keyed(&casual).unwrap().0, "Hey");
/// ```
pub struct ServiceKey<T: ?Sized> {
    key: Key,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ServiceKey<T> {
    /// Key whose identity is the type `T` itself.
    pub fn of_type() -> Self {
        Self {
            key: key_of_type::<T>(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> ServiceKey<T> {
    /// Mints a new unique key for `T`; see [`Key::token`].
    pub fn token(name: &'static str) -> Self {
        Self {
            key: Key::token(name),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl<T: ?Sized> Clone for ServiceKey<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ServiceKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.key).finish()
    }
}

impl<T: ?Sized> From<&ServiceKey<T>> for Key {
    fn from(key: &ServiceKey<T>) -> Self {
        key.key
    }
}
