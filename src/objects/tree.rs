//! Tree object
//!
//! A tree is a directory snapshot: an ordered list of `(mode, name, id)`
//! entries covering files (blobs) and subdirectories (other trees).
//!
//! ## Format
//!
//! Each entry on disk: `<octal-mode> <name>\0<20-byte-id>`
//!
//! Entries are sorted by name under the canonical comparator, which orders
//! a directory as if its name ended with `/`. Writing an incorrectly
//! sorted tree would create a corrupt object nobody could later read, so
//! serialization verifies the ordering instead of trusting the caller.

use crate::errors::StoreError;
use crate::objects::object::{Object, Packable, Unpackable};
use crate::objects::object_id::ObjectId;
use crate::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::cmp::Ordering;
use std::io::{BufRead, Write};

/// Regular file mode
pub const MODE_BLOB: u32 = 0o100644;
/// Executable file mode
pub const MODE_BLOB_EXECUTABLE: u32 = 0o100755;
/// Symbolic link mode
pub const MODE_SYMLINK: u32 = 0o120000;
/// Directory (subtree) mode
pub const MODE_TREE: u32 = 0o40000;

/// One `(mode, name, id)` record of a tree.
///
/// The id may be unassigned while a snapshot is still being built; trees
/// refuse to serialize until every entry has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    mode: u32,
    name: String,
    oid: Option<ObjectId>,
}

impl TreeEntry {
    pub fn new(mode: u32, name: impl Into<String>, oid: ObjectId) -> Self {
        TreeEntry {
            mode,
            name: name.into(),
            oid: Some(oid),
        }
    }

    /// An entry whose object id has not been assigned yet.
    pub fn pending(mode: u32, name: impl Into<String>) -> Self {
        TreeEntry {
            mode,
            name: name.into(),
            oid: None,
        }
    }

    pub fn assign_id(&mut self, oid: ObjectId) {
        self.oid = Some(oid);
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn oid(&self) -> Option<&ObjectId> {
        self.oid.as_ref()
    }

    pub fn is_tree(&self) -> bool {
        self.mode == MODE_TREE
    }
}

/// Canonical tree-entry name comparison.
///
/// Names compare as unsigned bytes; when one name is a prefix of the
/// other, the missing byte is taken to be `/` for a directory entry and
/// end-of-string otherwise. `("a.c", blob)` therefore sorts before
/// `("a", tree)` even though plain byte order says the opposite.
pub fn compare_names(a: &[u8], a_is_tree: bool, b: &[u8], b_is_tree: bool) -> Ordering {
    let common = a.len().min(b.len());
    match a[..common].cmp(&b[..common]) {
        Ordering::Equal => {}
        unequal => return unequal,
    }

    let terminator = |name: &[u8], is_tree: bool| -> u8 {
        match name.get(common) {
            Some(&next) => next,
            None if is_tree => b'/',
            None => 0,
        }
    };
    terminator(a, a_is_tree).cmp(&terminator(b, b_is_tree))
}

/// Directory snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    pub fn push(&mut self, entry: TreeEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Packable for Tree {
    /// Serialize all entries, verifying the canonical order and that
    /// every entry has an id.
    fn serialize_content(&self) -> anyhow::Result<Bytes> {
        let mut content = Vec::new();
        let mut previous: Option<&TreeEntry> = None;

        for entry in &self.entries {
            let oid = entry
                .oid()
                .ok_or_else(|| StoreError::MissingObjectId(entry.name.clone()))?;

            if let Some(last) = previous {
                let order = compare_names(
                    last.name.as_bytes(),
                    last.is_tree(),
                    entry.name.as_bytes(),
                    entry.is_tree(),
                );
                if order != Ordering::Less {
                    return Err(StoreError::UnsortedTree {
                        before: last.name.clone(),
                        after: entry.name.clone(),
                    }
                    .into());
                }
            }

            write!(content, "{:o} {}", entry.mode, entry.name)?;
            content.push(0);
            oid.write_raw_to(&mut content)?;
            previous = Some(entry);
        }

        Ok(Bytes::from(content))
    }
}

impl Unpackable for Tree {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = Vec::new();

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break; // clean EOF: no more entries
            }
            if mode_bytes.pop() != Some(b' ') {
                return Err(anyhow::anyhow!("unexpected EOF in mode"));
            }
            let mode = u32::from_str_radix(std::str::from_utf8(&mode_bytes)?, 8)
                .context("invalid entry mode")?;

            name_bytes.clear();
            let n = reader.read_until(b'\0', &mut name_bytes)?;
            if n == 0 || name_bytes.pop() != Some(b'\0') {
                return Err(anyhow::anyhow!("unexpected EOF in name"));
            }
            let name = std::str::from_utf8(&name_bytes)?.to_owned();

            let oid =
                ObjectId::read_raw_from(&mut reader).context("unexpected EOF in object id")?;

            entries.push(TreeEntry::new(mode, name, oid));
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Cursor;

    const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    fn blob_id() -> ObjectId {
        ObjectId::from_hex("b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0").unwrap()
    }

    fn tree_id() -> ObjectId {
        ObjectId::from_hex(EMPTY_TREE).unwrap()
    }

    #[rstest]
    fn empty_tree_matches_well_known_id() {
        assert_eq!(Tree::new().object_id().unwrap().to_hex(), EMPTY_TREE);
    }

    #[rstest]
    // two blobs: plain byte order, shorter name first
    #[case("a", false, "a.c", false, Ordering::Less)]
    // a directory sorts as "a/", after "a.c"
    #[case("a", true, "a.c", false, Ordering::Greater)]
    #[case("a.c", false, "a", true, Ordering::Less)]
    #[case("abc", false, "abc", true, Ordering::Less)]
    #[case("abc", true, "abc", true, Ordering::Equal)]
    fn comparator_orders_directories_with_trailing_slash(
        #[case] a: &str,
        #[case] a_is_tree: bool,
        #[case] b: &str,
        #[case] b_is_tree: bool,
        #[case] expected: Ordering,
    ) {
        assert_eq!(
            compare_names(a.as_bytes(), a_is_tree, b.as_bytes(), b_is_tree),
            expected
        );
    }

    #[rstest]
    fn serializes_sorted_entries() {
        let mut tree = Tree::new();
        tree.push(TreeEntry::new(MODE_BLOB, "a.c", blob_id()));
        tree.push(TreeEntry::new(MODE_TREE, "a", tree_id()));

        let content = tree.serialize_content().unwrap();
        let parsed = Tree::deserialize(Cursor::new(content.to_vec())).unwrap();
        assert_eq!(parsed.entries().len(), 2);
        assert_eq!(parsed.entries()[0].name(), "a.c");
        assert_eq!(parsed.entries()[1].name(), "a");
        assert_eq!(parsed.entries()[1].mode(), MODE_TREE);
    }

    #[rstest]
    fn rejects_entries_out_of_canonical_order() {
        // natural ASCII order, but "a" is a directory and must sort last
        let mut tree = Tree::new();
        tree.push(TreeEntry::new(MODE_TREE, "a", tree_id()));
        tree.push(TreeEntry::new(MODE_BLOB, "a.c", blob_id()));

        let err = tree.serialize_content().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::UnsortedTree { .. })
        ));
    }

    #[rstest]
    fn rejects_duplicate_names() {
        let mut tree = Tree::new();
        tree.push(TreeEntry::new(MODE_BLOB, "same", blob_id()));
        tree.push(TreeEntry::new(MODE_BLOB, "same", blob_id()));

        let err = tree.serialize_content().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::UnsortedTree { .. })
        ));
    }

    #[rstest]
    fn rejects_entries_without_an_id() {
        let mut tree = Tree::new();
        tree.push(TreeEntry::pending(MODE_BLOB, "orphan"));

        let err = tree.serialize_content().unwrap_err();
        match err.downcast_ref::<StoreError>() {
            Some(StoreError::MissingObjectId(name)) => assert_eq!(name, "orphan"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[rstest]
    fn mode_is_rendered_without_leading_zeroes() {
        let mut tree = Tree::new();
        tree.push(TreeEntry::new(MODE_TREE, "dir", tree_id()));
        let content = tree.serialize_content().unwrap();
        assert!(content.starts_with(b"40000 dir\0"));
    }
}
