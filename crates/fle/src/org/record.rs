//! The per-organisation key record: the active wrapped DEK plus any retired
//! generations still needed to read older ciphertexts.

/// One DEK generation, wrapped under the master key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedDek {
    /// Monotonic generation number, starting at 1.
    pub generation: u32,
    /// Opaque KMS output (`Org.encryptedDekBlob` for the active generation).
    pub blob: Vec<u8>,
}

/// Everything stored for one organisation's data keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgKeyRecord {
    /// The generation new ciphertexts are sealed under.
    pub active: WrappedDek,
    /// Older generations kept so existing ciphertexts stay readable.
    pub retired: Vec<WrappedDek>,
}

impl OrgKeyRecord {
    /// A record holding a single active generation.
    pub fn new(active: WrappedDek) -> Self {
        Self {
            active,
            retired: Vec::new(),
        }
    }

    /// Find the wrapped DEK for `generation`, active or retired.
    pub fn find(&self, generation: u32) -> Option<&WrappedDek> {
        std::iter::once(&self.active)
            .chain(self.retired.iter())
            .find(|w| w.generation == generation)
    }

    /// Highest generation present in the record.
    pub fn max_generation(&self) -> u32 {
        self.retired
            .iter()
            .map(|w| w.generation)
            .fold(self.active.generation, u32::max)
    }

    /// All generations, active first.
    pub fn iter(&self) -> impl Iterator<Item = &WrappedDek> {
        std::iter::once(&self.active).chain(self.retired.iter())
    }

    /// Make `next` active, moving the current active generation to `retired`.
    pub(crate) fn promote(&mut self, next: WrappedDek) {
        let previous = std::mem::replace(&mut self.active, next);
        self.retired.push(previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapped(generation: u32) -> WrappedDek {
        WrappedDek {
            generation,
            blob: vec![generation as u8; 4],
        }
    }

    #[test]
    fn find_searches_active_and_retired() {
        let mut record = OrgKeyRecord::new(wrapped(1));
        record.promote(wrapped(2));
        assert_eq!(record.active.generation, 2);
        assert_eq!(record.find(1), Some(&wrapped(1)));
        assert_eq!(record.find(2), Some(&wrapped(2)));
        assert!(record.find(3).is_none());
    }

    #[test]
    fn max_generation_covers_retired() {
        let record = OrgKeyRecord {
            active: wrapped(2),
            retired: vec![wrapped(5), wrapped(1)],
        };
        assert_eq!(record.max_generation(), 5);
        assert_eq!(record.iter().count(), 3);
    }
}
