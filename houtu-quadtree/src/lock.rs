use std::collections::HashSet;

/// Handle used to take a [`Lock`]. Keys come from a [`KeyAllocator`] so two
/// holders never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(u64);

impl Key {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct KeyAllocator {
    counter: u64,
}

impl KeyAllocator {
    pub fn next_key(&mut self) -> Key {
        self.counter += 1;
        Key(self.counter)
    }
}

/// Cooperative lock: free while nobody holds a key in it. Holding it only
/// stops new work from starting, work already running is not affected.
#[derive(Debug, Default)]
pub struct Lock {
    keys: HashSet<Key>,
}

impl Lock {
    pub fn lock(&mut self, key: Key) {
        self.keys.insert(key);
    }

    pub fn free(&mut self, key: Key) {
        self.keys.remove(&key);
    }

    pub fn is_free(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_locked(&self) -> bool {
        !self.keys.is_empty()
    }
}
