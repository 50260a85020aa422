use crate::objects::object::{Object, Packable, Unpackable};
use crate::objects::object_type::ObjectType;
use bytes::Bytes;
use std::io::{BufRead, Read};

/// Opaque file content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob {
    data: Bytes,
}

impl Blob {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Blob { data: data.into() }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}

impl Packable for Blob {
    fn serialize_content(&self) -> anyhow::Result<Bytes> {
        Ok(self.data.clone())
    }
}

impl Unpackable for Blob {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Blob::new(data))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(b"".to_vec(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391")]
    #[case(b"hello".to_vec(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0")]
    fn hashes_known_vectors(#[case] data: Vec<u8>, #[case] expected: &str) {
        let blob = Blob::new(data);
        assert_eq!(blob.object_id().unwrap().to_hex(), expected);
    }

    #[rstest]
    fn serializes_with_canonical_header() {
        let blob = Blob::new(&b"hello"[..]);
        assert_eq!(blob.serialize().unwrap().as_ref(), b"blob 5\0hello");
    }
}
