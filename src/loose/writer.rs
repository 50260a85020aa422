//! Loose object writer
//!
//! Writing is a single pass: each input chunk feeds the SHA-1 digest and
//! the deflate stream in lockstep, so the file holds compressed bytes
//! while the digest sees the canonical uncompressed form. The object id
//! is only known once the stream ends, which is why the write lands in a
//! temp file first and is committed with an atomic rename.

use crate::database::ObjectDatabase;
use crate::errors::StoreError;
use crate::objects::commit::Commit;
use crate::objects::object::Packable;
use crate::objects::object_id::ObjectId;
use crate::objects::object_type::ObjectType;
use crate::objects::tree::Tree;
use anyhow::Context;
use flate2::write::ZlibEncoder;
use sha1::{Digest, Sha1};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// Chunk size for streaming the payload
const BUFFER_SIZE: usize = 8192;

/// Feeds every written chunk to a SHA-1 digest and the wrapped writer in
/// lockstep.
pub(crate) struct HashingWriter<W: Write> {
    inner: W,
    digest: Sha1,
}

impl<W: Write> HashingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        HashingWriter {
            inner,
            digest: Sha1::new(),
        }
    }

    /// Advance the digest without writing, for bytes the file carries in
    /// another form.
    pub(crate) fn update_digest_only(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub(crate) fn into_parts(self) -> (W, Sha1) {
        (self.inner, self.digest)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.digest.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Removes the temp file unless the write committed.
struct TempObject {
    path: PathBuf,
    armed: bool,
}

impl TempObject {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempObject {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Writes objects into the loose layout of an [`ObjectDatabase`].
///
/// A writer instance is exclusively owned by one thread; the deflate state
/// inside each write is never shared.
pub struct ObjectWriter<'db> {
    db: &'db ObjectDatabase,
}

impl<'db> ObjectWriter<'db> {
    pub fn new(db: &'db ObjectDatabase) -> Self {
        ObjectWriter { db }
    }

    /// Write a blob held in memory.
    pub fn write_blob(&self, data: &[u8]) -> anyhow::Result<ObjectId> {
        self.write_object(ObjectType::Blob, data.len() as u64, Cursor::new(data))
    }

    /// Write a blob streamed from a file on disk.
    pub fn write_blob_file(&self, path: &Path) -> anyhow::Result<ObjectId> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Unable to open blob source {}", path.display()))?;
        let length = file
            .metadata()
            .with_context(|| format!("Unable to stat blob source {}", path.display()))?
            .len();
        self.write_object(ObjectType::Blob, length, file)
    }

    /// Write a blob from a length-delimited stream.
    pub fn write_blob_stream(&self, length: u64, reader: impl Read) -> anyhow::Result<ObjectId> {
        self.write_object(ObjectType::Blob, length, reader)
    }

    /// Write a tree, verifying entry order and assigned ids.
    pub fn write_tree(&self, tree: &Tree) -> anyhow::Result<ObjectId> {
        let content = tree.serialize_content()?;
        self.write_object(ObjectType::Tree, content.len() as u64, Cursor::new(content))
    }

    /// Write a commit.
    pub fn write_commit(&self, commit: &Commit) -> anyhow::Result<ObjectId> {
        let content = commit.serialize_content()?;
        self.write_object(
            ObjectType::Commit,
            content.len() as u64,
            Cursor::new(content),
        )
    }

    /// Write one object of any kind from a length-delimited stream.
    ///
    /// Streams up to `length` bytes out of `reader` through the digest and
    /// the deflate stream, then commits the temp file under the computed
    /// id. Writing an object that already exists is a successful no-op.
    ///
    /// # Returns
    ///
    /// The object id, or `ShortInput` when the stream ends early,
    /// `WriteFailed` when the rename cannot be completed and the object
    /// is still absent.
    pub fn write_object(
        &self,
        kind: ObjectType,
        length: u64,
        mut reader: impl Read,
    ) -> anyhow::Result<ObjectId> {
        let objects_dir = self.db.objects_path();
        let mut temp = TempObject {
            path: objects_dir.join(format!("tmp-obj-{}", rand::random::<u32>())),
            armed: true,
        };

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp.path)
            .with_context(|| format!("Unable to open temp object {}", temp.path.display()))?;

        let legacy = self.db.config().use_legacy_headers;
        if !legacy {
            // the packed-style header stays outside the compressed stream
            file.write_all(&encode_packed_header(kind.code(), length))
                .context("Unable to write loose object header")?;
        }

        let encoder = ZlibEncoder::new(file, self.db.config().deflate_level());
        let mut sink = HashingWriter::new(encoder);

        let header = format!("{} {}\0", kind.as_str(), length);
        if legacy {
            sink.write_all(header.as_bytes())
                .context("Unable to write loose object header")?;
        } else {
            sink.update_digest_only(header.as_bytes());
        }

        let mut buffer = [0u8; BUFFER_SIZE];
        let mut remaining = length;
        while remaining > 0 {
            let want = remaining.min(BUFFER_SIZE as u64) as usize;
            let read = reader
                .read(&mut buffer[..want])
                .context("Unable to read object payload")?;
            if read == 0 {
                break;
            }
            sink.write_all(&buffer[..read])
                .context("Unable to write object payload")?;
            remaining -= read as u64;
        }
        if remaining > 0 {
            return Err(StoreError::ShortInput { missing: remaining }.into());
        }

        let (encoder, digest) = sink.into_parts();
        let file = encoder
            .finish()
            .context("Unable to finish compressing object")?;

        let mut permissions = file
            .metadata()
            .context("Unable to stat temp object")?
            .permissions();
        permissions.set_readonly(true);
        file.set_permissions(permissions)
            .context("Unable to mark temp object read-only")?;
        drop(file);

        let id = ObjectId::new(digest.finalize().into());
        self.commit(&mut temp, &id)?;
        Ok(id)
    }

    /// Move the finished temp file into its final location.
    fn commit(&self, temp: &mut TempObject, id: &ObjectId) -> anyhow::Result<()> {
        if self.db.has_object(id) {
            // Object is already in the database, drop the temp file.
            tracing::trace!(id = %id, "loose write deduplicated");
            return Ok(());
        }

        let final_path = self.db.objects_path().join(id.to_loose_path());
        if std::fs::rename(&temp.path, &final_path).is_ok() {
            temp.disarm();
            tracing::debug!(id = %id, "stored loose object");
            return Ok(());
        }

        // Maybe the fan-out directory doesn't exist yet; it is created
        // lazily, and the rename is tried first because it usually does.
        if let Some(parent) = final_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if std::fs::rename(&temp.path, &final_path).is_ok() {
            temp.disarm();
            tracing::debug!(id = %id, "stored loose object");
            return Ok(());
        }

        if self.db.has_object(id) {
            // A concurrent writer of the same bytes won the rename.
            tracing::trace!(id = %id, "loose write deduplicated");
            return Ok(());
        }
        Err(StoreError::WriteFailed(final_path).into())
    }
}

/// Encode the packed-style variable-length `(type, length)` header.
///
/// First byte: bit 7 continuation, bits 4-6 type code, bits 0-3 the low
/// four bits of the length; continuation bytes carry seven more length
/// bits each, little-endian.
fn encode_packed_header(type_code: u8, length: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(10);
    let mut size = length;
    let mut current = ((type_code & 0x07) << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size > 0 {
        header.push(current | 0x80);
        current = (size & 0x7f) as u8;
        size >>= 7;
    }
    header.push(current);
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(3, 0, vec![0x30])] // blob, zero length
    #[case(3, 5, vec![0x35])] // blob, length fits four bits
    #[case(1, 16, vec![0x90, 0x01])] // commit, needs one continuation
    #[case(2, 0x1234, vec![0xa4, 0xa3, 0x02])] // tree, two continuations
    fn packed_header_encoding(#[case] code: u8, #[case] length: u64, #[case] expected: Vec<u8>) {
        assert_eq!(encode_packed_header(code, length), expected);
    }

    #[rstest]
    fn hashing_writer_tracks_written_bytes() {
        let mut sink = HashingWriter::new(Vec::new());
        sink.update_digest_only(b"blob 5\0");
        sink.write_all(b"hello").unwrap();

        let (written, digest) = sink.into_parts();
        assert_eq!(written, b"hello");
        let id = ObjectId::new(digest.finalize().into());
        assert_eq!(id.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
    }
}
