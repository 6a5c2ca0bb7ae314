use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Integer handle into a device-side arena. The type parameter only tags
/// which arena the index belongs to.
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

// Manual impls so that `T` itself needs none of these traits.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "{}#{}", short, self.index)
    }
}

impl<T> Handle<T> {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub const fn index(&self) -> u32 {
        self.index
    }
}

/// Hands out monotonically increasing handles; indices are never reused so a
/// stale handle can never alias a newer object.
#[derive(Debug)]
pub struct HandleAllocator<T> {
    next: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for HandleAllocator<T> {
    fn default() -> Self {
        Self {
            next: 1,
            _marker: PhantomData,
        }
    }
}

impl<T> HandleAllocator<T> {
    pub fn allocate(&mut self) -> Handle<T> {
        let handle = Handle::new(self.next);
        self.next += 1;
        handle
    }
}
