use std::io::BufRead;

/// The four storable object kinds.
///
/// The numeric codes are the ones packs use in their entry headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
        }
    }

    /// Pack type code: `1=commit, 2=tree, 3=blob, 4=tag`.
    pub fn code(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
        }
    }

    pub fn from_code(code: u8) -> anyhow::Result<ObjectType> {
        match code {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            _ => Err(anyhow::anyhow!("Invalid object type code {code}")),
        }
    }

    /// Consume and parse a canonical `"<type> <length>\0"` header.
    pub fn parse_header(reader: &mut impl BufRead) -> anyhow::Result<(ObjectType, u64)> {
        let mut type_bytes = Vec::new();
        reader.read_until(b' ', &mut type_bytes)?;
        if type_bytes.pop() != Some(b' ') {
            return Err(anyhow::anyhow!("Truncated object header"));
        }
        let object_type = ObjectType::try_from(std::str::from_utf8(&type_bytes)?)?;

        let mut length_bytes = Vec::new();
        reader.read_until(b'\0', &mut length_bytes)?;
        if length_bytes.pop() != Some(b'\0') {
            return Err(anyhow::anyhow!("Truncated object header"));
        }
        let length = std::str::from_utf8(&length_bytes)?
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("Invalid object length"))?;

        Ok((object_type, length))
    }
}

impl TryFrom<&str> for ObjectType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "commit" => Ok(ObjectType::Commit),
            "tree" => Ok(ObjectType::Tree),
            "blob" => Ok(ObjectType::Blob),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(anyhow::anyhow!("Invalid object type {value:?}")),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case(ObjectType::Commit, 1, "commit")]
    #[case(ObjectType::Tree, 2, "tree")]
    #[case(ObjectType::Blob, 3, "blob")]
    #[case(ObjectType::Tag, 4, "tag")]
    fn codes_and_names_round_trip(
        #[case] object_type: ObjectType,
        #[case] code: u8,
        #[case] name: &str,
    ) {
        assert_eq!(object_type.code(), code);
        assert_eq!(object_type.as_str(), name);
        assert_eq!(ObjectType::from_code(code).unwrap(), object_type);
        assert_eq!(ObjectType::try_from(name).unwrap(), object_type);
    }

    #[rstest]
    #[case(0)]
    #[case(5)] // reserved
    #[case(6)] // ofs-delta is not a storable kind
    #[case(7)] // ref-delta is not a storable kind
    fn rejects_non_storable_codes(#[case] code: u8) {
        assert!(ObjectType::from_code(code).is_err());
    }

    #[rstest]
    fn parses_canonical_header() {
        let mut reader = Cursor::new(b"blob 5\0hello".to_vec());
        let (object_type, length) = ObjectType::parse_header(&mut reader).unwrap();
        assert_eq!(object_type, ObjectType::Blob);
        assert_eq!(length, 5);
    }

    #[rstest]
    #[case(b"blob5\0".to_vec())]
    #[case(b"blob ".to_vec())]
    #[case(b"blob x\0".to_vec())]
    fn rejects_malformed_header(#[case] bytes: Vec<u8>) {
        assert!(ObjectType::parse_header(&mut Cursor::new(bytes)).is_err());
    }
}
