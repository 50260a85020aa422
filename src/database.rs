//! Object database façade
//!
//! Unifies the loose layout and any number of packs behind three
//! operations: `has_object`, `open_object`, `write_object`. Lookups probe
//! the loose path first (a cheap existence check on the fan-out
//! directory), then each cached pack index; when everything misses, the
//! pack directory is rescanned once so packs that appeared on disk since
//! the last scan are picked up.
//!
//! Readers are thread-safe: the pack list sits behind a read-write lock
//! and pack data is only touched through positional reads. Writers are
//! serialized per object id by the rename-based commit.

use crate::config::CoreConfig;
use crate::errors::StoreError;
use crate::loose;
use crate::loose::writer::ObjectWriter;
use crate::objects::commit::Commit;
use crate::objects::object::RawObject;
use crate::objects::object_id::ObjectId;
use crate::objects::object_type::ObjectType;
use crate::objects::tree::Tree;
use crate::pack::{DeltaBaseSource, Pack};
use anyhow::Context;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Loaded packs plus the index files already considered, so a rescan
/// only touches newcomers.
#[derive(Debug, Default)]
struct PackSet {
    packs: Vec<Arc<Pack>>,
    seen: HashSet<PathBuf>,
}

/// Content-addressed object database over one `objects/` directory.
#[derive(Debug)]
pub struct ObjectDatabase {
    objects_dir: PathBuf,
    config: CoreConfig,
    packs: RwLock<PackSet>,
}

impl ObjectDatabase {
    /// Open (creating if necessary) the database rooted at `objects_dir`.
    pub fn open(objects_dir: impl Into<PathBuf>, config: CoreConfig) -> anyhow::Result<Self> {
        let objects_dir = objects_dir.into();
        std::fs::create_dir_all(&objects_dir).with_context(|| {
            format!(
                "Unable to create objects directory {}",
                objects_dir.display()
            )
        })?;

        Ok(ObjectDatabase {
            objects_dir,
            config,
            packs: RwLock::new(PackSet::default()),
        })
    }

    pub fn objects_path(&self) -> &Path {
        &self.objects_dir
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Whether `id` is stored, loose or packed.
    ///
    /// Monotonic within a run: once true for an id, it stays true.
    pub fn has_object(&self, id: &ObjectId) -> bool {
        if self.objects_dir.join(id.to_loose_path()).is_file() {
            return true;
        }
        if self.pack_snapshot().iter().any(|pack| pack.has_object(id)) {
            return true;
        }
        match self.scan_packs() {
            Ok(true) => self.pack_snapshot().iter().any(|pack| pack.has_object(id)),
            Ok(false) => false,
            Err(err) => {
                tracing::debug!(error = %err, "pack rescan failed");
                false
            }
        }
    }

    /// Open the object stored under `id`.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the object is absent anywhere; an error only when
    /// an object is present but unreadable.
    pub fn open_object(&self, id: &ObjectId) -> anyhow::Result<Option<RawObject>> {
        if let Some(object) = loose::read(&self.objects_dir, id)? {
            return Ok(Some(object));
        }

        if let Some(object) = self.open_packed(id)? {
            return Ok(Some(object));
        }

        if self.scan_packs()? {
            return self.open_packed(id);
        }
        Ok(None)
    }

    /// Write one object from a length-delimited stream.
    pub fn write_object(
        &self,
        kind: ObjectType,
        length: u64,
        reader: impl Read,
    ) -> anyhow::Result<ObjectId> {
        ObjectWriter::new(self).write_object(kind, length, reader)
    }

    /// Write a blob held in memory.
    pub fn write_blob(&self, data: &[u8]) -> anyhow::Result<ObjectId> {
        ObjectWriter::new(self).write_blob(data)
    }

    /// Write a blob streamed from a file.
    pub fn write_blob_file(&self, path: &Path) -> anyhow::Result<ObjectId> {
        ObjectWriter::new(self).write_blob_file(path)
    }

    /// Write a tree, verifying entry order and assigned ids.
    pub fn write_tree(&self, tree: &Tree) -> anyhow::Result<ObjectId> {
        ObjectWriter::new(self).write_tree(tree)
    }

    /// Write a commit.
    pub fn write_commit(&self, commit: &Commit) -> anyhow::Result<ObjectId> {
        ObjectWriter::new(self).write_commit(commit)
    }

    /// Find all stored ids beginning with a hex prefix.
    ///
    /// Used to resolve abbreviated ids; more than one match means the
    /// prefix is ambiguous. Searches the loose fan-out directories and
    /// every pack index.
    pub fn resolve_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        if !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::BadFormat(prefix.to_string()).into());
        }

        let mut matches = Vec::new();
        self.collect_loose_matches(prefix, &mut matches)?;

        let _ = self.scan_packs();
        for pack in self.pack_snapshot() {
            for entry in pack.index().entries() {
                if entry.oid.matches_prefix(prefix) {
                    matches.push(entry.oid);
                }
            }
        }

        matches.sort();
        matches.dedup();
        Ok(matches)
    }

    /// Drop every cached pack handle.
    ///
    /// The next lookup rediscovers whatever the pack directory then
    /// holds; required after packs are deleted out from under the
    /// database.
    pub fn invalidate_packs(&self) {
        let mut set = self.packs.write().expect("pack set lock poisoned");
        set.packs.clear();
        set.seen.clear();
    }

    fn open_packed(&self, id: &ObjectId) -> anyhow::Result<Option<RawObject>> {
        for pack in self.pack_snapshot() {
            if let Some(offset) = pack.find_offset(id) {
                return pack.read(offset, self).map(Some);
            }
        }
        Ok(None)
    }

    fn pack_snapshot(&self) -> Vec<Arc<Pack>> {
        self.packs
            .read()
            .expect("pack set lock poisoned")
            .packs
            .clone()
    }

    /// Pick up `.idx` files that appeared since the last scan.
    ///
    /// # Returns
    ///
    /// Whether any new pack was added.
    fn scan_packs(&self) -> anyhow::Result<bool> {
        let pack_dir = self.objects_dir.join("pack");
        if !pack_dir.is_dir() {
            return Ok(false);
        }

        let mut added = false;
        let mut set = self.packs.write().expect("pack set lock poisoned");
        for entry in std::fs::read_dir(&pack_dir)
            .with_context(|| format!("Unable to list pack directory {}", pack_dir.display()))?
        {
            let idx_path = entry?.path();
            if idx_path.extension().map_or(true, |ext| ext != "idx") || set.seen.contains(&idx_path)
            {
                continue;
            }
            set.seen.insert(idx_path.clone());

            let pack_path = idx_path.with_extension("pack");
            if !pack_path.is_file() {
                tracing::debug!(idx = %idx_path.display(), "index without pack, skipping");
                continue;
            }
            match Pack::open(&pack_path, &idx_path) {
                Ok(pack) => {
                    tracing::debug!(
                        pack = %pack_path.display(),
                        objects = pack.index().object_count(),
                        "pack discovered"
                    );
                    set.packs.push(Arc::new(pack));
                    added = true;
                }
                Err(err) => {
                    tracing::warn!(pack = %pack_path.display(), error = %err, "unreadable pack, skipping");
                }
            }
        }
        Ok(added)
    }

    fn collect_loose_matches(
        &self,
        prefix: &str,
        matches: &mut Vec<ObjectId>,
    ) -> anyhow::Result<()> {
        // with two or more prefix characters only one fan-out directory
        // can hold matches
        let dirs: Vec<String> = if prefix.len() >= 2 {
            vec![prefix[..2].to_ascii_lowercase()]
        } else {
            (0u16..=255).map(|b| format!("{b:02x}")).collect()
        };

        for dir_name in dirs {
            let dir_path = self.objects_dir.join(&dir_name);
            if !dir_path.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&dir_path)? {
                let file_name = entry?.file_name();
                let Some(rest) = file_name.to_str() else {
                    continue;
                };
                let full_hex = format!("{dir_name}{rest}");
                if let Ok(oid) = ObjectId::from_hex(&full_hex) {
                    if oid.matches_prefix(prefix) {
                        matches.push(oid);
                    }
                }
            }
        }
        Ok(())
    }
}

impl DeltaBaseSource for ObjectDatabase {
    fn delta_base(&self, id: &ObjectId) -> anyhow::Result<Option<RawObject>> {
        self.open_object(id)
    }
}
