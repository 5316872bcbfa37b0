//! Packed child references of one composite object.
//!
//! Keys and children live in a single flat `u32` buffer. Each key occupies a
//! fixed header `[tag_name_id, tag_version, child_count]` immediately
//! followed by `child_count` object ids:
//!
//! ```text
//! | tag | ver | n | child_0 .. child_n-1 | tag | ver | m | child_0 .. |
//! ```
//!
//! Array-valued fields with many children stay dense this way. Every scan
//! validates declared child counts against the remaining buffer before
//! trusting them.

use crate::error::TranscriptionError;
use crate::model::{ObjectId, ObjectKey, UNUSED_OBJECT_ID};

const KEY_HEADER_LEN: usize = 3;

/// Child references of a composite object, keyed by [`ObjectKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeObject {
    data: Vec<u32>,
    num_keys: u32,
}

impl CompositeObject {
    /// Creates an empty composite object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys.
    pub fn num_keys(&self) -> u32 {
        self.num_keys
    }

    /// Returns the key at `index`, in storage order.
    pub fn key(&self, index: u32) -> Result<ObjectKey, TranscriptionError> {
        match self.entries().nth(index as usize) {
            Some(entry) => entry.map(|(key, _)| key),
            None => Err(TranscriptionError::KeyIndexOutOfRange {
                index,
                num_keys: self.num_keys,
            }),
        }
    }

    /// Iterates over `(key, children)` in storage order.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            data: &self.data,
            pos: 0,
        }
    }

    /// Iterates over keys in storage order.
    pub fn keys(&self) -> impl Iterator<Item = Result<ObjectKey, TranscriptionError>> + '_ {
        self.entries().map(|entry| entry.map(|(key, _)| key))
    }

    /// Returns the children stored under `key`, holes included.
    pub fn children(&self, key: ObjectKey) -> Result<Option<&[ObjectId]>, TranscriptionError> {
        Ok(self.find_key(key)?.map(|header| {
            let count = self.data[header + 2] as usize;
            let start = header + KEY_HEADER_LEN;
            &self.data[start..start + count]
        }))
    }

    /// Returns the number of children under `key` (zero if absent).
    pub fn num_children_with_key(&self, key: ObjectKey) -> Result<u32, TranscriptionError> {
        Ok(self
            .find_key(key)?
            .map(|header| self.data[header + 2])
            .unwrap_or(0))
    }

    /// Returns child `index` under `key`.
    ///
    /// A hole is returned as [`UNUSED_OBJECT_ID`]; use
    /// [`has_valid_child`](Self::has_valid_child) to skip holes.
    pub fn child(&self, key: ObjectKey, index: u32) -> Result<ObjectId, TranscriptionError> {
        let children = self
            .children(key)?
            .ok_or(TranscriptionError::KeyNotFound { key })?;
        children
            .get(index as usize)
            .copied()
            .ok_or(TranscriptionError::ChildIndexOutOfRange {
                key,
                index,
                num_children: children.len() as u32,
            })
    }

    /// Returns child `index` under `key`, or `None` if the key is absent,
    /// the index is out of range or the slot is a hole.
    pub fn has_valid_child(
        &self,
        key: ObjectKey,
        index: u32,
    ) -> Result<Option<ObjectId>, TranscriptionError> {
        Ok(self
            .children(key)?
            .and_then(|children| children.get(index as usize).copied())
            .filter(|&child| child != UNUSED_OBJECT_ID))
    }

    /// Appends `child` to the end of the child list for `key`.
    pub fn add_child(&mut self, key: ObjectKey, child: ObjectId) -> Result<(), TranscriptionError> {
        match self.find_key(key)? {
            Some(header) => {
                let count = self.data[header + 2] as usize;
                self.data.insert(header + KEY_HEADER_LEN + count, child);
                self.data[header + 2] += 1;
            }
            None => {
                self.data
                    .extend_from_slice(&[key.tag_name_id, key.tag_version, 1, child]);
                self.num_keys += 1;
            }
        }
        Ok(())
    }

    /// Sets child `index` under `key`.
    ///
    /// The child list grows as needed, filling any gap with holes. Setting a
    /// slot that is already occupied is an error.
    pub fn set_child(
        &mut self,
        key: ObjectKey,
        child: ObjectId,
        index: u32,
    ) -> Result<(), TranscriptionError> {
        if index == u32::MAX {
            return Err(TranscriptionError::ChildIndexOutOfRange {
                key,
                index,
                num_children: self.num_children_with_key(key)?,
            });
        }
        let index_usize = index as usize;
        match self.find_key(key)? {
            Some(header) => {
                let count = self.data[header + 2] as usize;
                let start = header + KEY_HEADER_LEN;
                if index_usize < count {
                    let slot = &mut self.data[start + index_usize];
                    if *slot != UNUSED_OBJECT_ID {
                        return Err(TranscriptionError::ChildAlreadySet { key, index });
                    }
                    *slot = child;
                } else {
                    let gap = index_usize - count;
                    let end = start + count;
                    self.data.splice(
                        end..end,
                        std::iter::repeat_n(UNUSED_OBJECT_ID, gap).chain(std::iter::once(child)),
                    );
                    self.data[header + 2] = index + 1;
                }
            }
            None => {
                self.data
                    .extend_from_slice(&[key.tag_name_id, key.tag_version, index + 1]);
                self.data
                    .extend(std::iter::repeat_n(UNUSED_OBJECT_ID, index_usize));
                self.data.push(child);
                self.num_keys += 1;
            }
        }
        Ok(())
    }

    /// Finds the header offset of `key`, validating each header on the way.
    fn find_key(&self, key: ObjectKey) -> Result<Option<usize>, TranscriptionError> {
        let mut pos = 0;
        while pos < self.data.len() {
            let end = entry_end(&self.data, pos)?;
            if self.data[pos] == key.tag_name_id && self.data[pos + 1] == key.tag_version {
                return Ok(Some(pos));
            }
            pos = end;
        }
        Ok(None)
    }
}

/// Returns the end offset of the key entry at `pos`, checking bounds.
fn entry_end(data: &[u32], pos: usize) -> Result<usize, TranscriptionError> {
    if pos + KEY_HEADER_LEN > data.len() {
        return Err(TranscriptionError::CorruptComposite {
            context: "key header overruns buffer",
        });
    }
    let end = pos + KEY_HEADER_LEN + data[pos + 2] as usize;
    if end > data.len() {
        return Err(TranscriptionError::CorruptComposite {
            context: "child count overruns buffer",
        });
    }
    Ok(end)
}

/// Iterator over the `(key, children)` entries of a [`CompositeObject`].
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    data: &'a [u32],
    pos: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<(ObjectKey, &'a [ObjectId]), TranscriptionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let pos = self.pos;
        match entry_end(self.data, pos) {
            Ok(end) => {
                self.pos = end;
                let key = ObjectKey::new(self.data[pos], self.data[pos + 1]);
                Some(Ok((key, &self.data[pos + KEY_HEADER_LEN..end])))
            }
            Err(err) => {
                // Stop after reporting corruption.
                self.pos = self.data.len();
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tag: u32) -> ObjectKey {
        ObjectKey::new(tag, 0)
    }

    #[test]
    fn test_add_child_appends() {
        let mut composite = CompositeObject::new();
        composite.add_child(key(0), 10).unwrap();
        composite.add_child(key(1), 20).unwrap();
        composite.add_child(key(0), 11).unwrap();

        assert_eq!(composite.num_keys(), 2);
        assert_eq!(composite.num_children_with_key(key(0)).unwrap(), 2);
        assert_eq!(composite.child(key(0), 0).unwrap(), 10);
        assert_eq!(composite.child(key(0), 1).unwrap(), 11);
        assert_eq!(composite.child(key(1), 0).unwrap(), 20);
        assert_eq!(composite.key(0).unwrap(), key(0));
        assert_eq!(composite.key(1).unwrap(), key(1));
    }

    #[test]
    fn test_set_child_with_holes() {
        let mut composite = CompositeObject::new();
        composite.set_child(key(7), 100, 0).unwrap();
        composite.set_child(key(7), 103, 3).unwrap();

        assert_eq!(composite.num_children_with_key(key(7)).unwrap(), 4);
        assert_eq!(composite.has_valid_child(key(7), 0).unwrap(), Some(100));
        assert_eq!(composite.has_valid_child(key(7), 1).unwrap(), None);
        assert_eq!(composite.has_valid_child(key(7), 2).unwrap(), None);
        assert_eq!(composite.has_valid_child(key(7), 3).unwrap(), Some(103));
        assert_eq!(composite.child(key(7), 1).unwrap(), UNUSED_OBJECT_ID);

        // Fill a hole later.
        composite.set_child(key(7), 101, 1).unwrap();
        assert_eq!(composite.has_valid_child(key(7), 1).unwrap(), Some(101));
    }

    #[test]
    fn test_set_child_grows_key_in_middle() {
        let mut composite = CompositeObject::new();
        composite.add_child(key(0), 1).unwrap();
        composite.add_child(key(1), 2).unwrap();
        composite.set_child(key(0), 5, 2).unwrap();

        assert_eq!(composite.children(key(0)).unwrap(), Some(&[1, UNUSED_OBJECT_ID, 5][..]));
        assert_eq!(composite.children(key(1)).unwrap(), Some(&[2][..]));
    }

    #[test]
    fn test_set_child_occupied() {
        let mut composite = CompositeObject::new();
        composite.set_child(key(0), 1, 0).unwrap();
        let result = composite.set_child(key(0), 2, 0);
        assert!(matches!(result, Err(TranscriptionError::ChildAlreadySet { index: 0, .. })));
    }

    #[test]
    fn test_missing_key() {
        let composite = CompositeObject::new();
        assert_eq!(composite.num_children_with_key(key(3)).unwrap(), 0);
        assert_eq!(composite.has_valid_child(key(3), 0).unwrap(), None);
        assert!(matches!(
            composite.child(key(3), 0),
            Err(TranscriptionError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_versions_are_distinct_keys() {
        let mut composite = CompositeObject::new();
        composite.add_child(ObjectKey::new(0, 0), 1).unwrap();
        composite.add_child(ObjectKey::new(0, 1), 2).unwrap();
        assert_eq!(composite.num_keys(), 2);
        assert_eq!(composite.child(ObjectKey::new(0, 1), 0).unwrap(), 2);
    }

    #[test]
    fn test_corrupt_layout_detected() {
        let composite = CompositeObject {
            data: vec![0, 0, 5, 1],
            num_keys: 1,
        };
        assert!(matches!(
            composite.num_children_with_key(key(9)),
            Err(TranscriptionError::CorruptComposite { .. })
        ));
        let entries: Vec<_> = composite.entries().collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_err());
    }
}
