//! Commit object
//!
//! ## Format
//!
//! ```text
//! commit <size>\0
//! tree <tree-sha>
//! parent <parent-sha>
//! author <name> <email> <epoch> <zone>
//! committer <name> <email> <epoch> <zone>
//!
//! <commit message>
//! ```
//!
//! Zero parents for an initial commit, several for a merge.

use crate::objects::object::{Object, Packable, Unpackable};
use crate::objects::object_id::ObjectId;
use crate::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::io::{BufRead, Read, Write};

/// Author or committer identity.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author {
    name: String,
    email: String,
    timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl Author {
    /// Identity stamped with the current local time.
    pub fn new(name: String, email: String) -> Self {
        Author {
            name,
            email,
            timestamp: chrono::Local::now().fixed_offset(),
        }
    }

    pub fn new_with_timestamp(
        name: String,
        email: String,
        timestamp: chrono::DateTime<chrono::FixedOffset>,
    ) -> Self {
        Author {
            name,
            email,
            timestamp,
        }
    }

    /// External form: `Name <email> epoch ±hhmm`.
    pub fn to_external_string(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.timestamp(),
            self.timestamp.format("%z")
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.timestamp
    }
}

impl TryFrom<&str> for Author {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Split from the right: zone, epoch, then "name <email>"
        let parts: Vec<&str> = value.rsplitn(3, ' ').collect();
        if parts.len() < 3 {
            return Err(anyhow::anyhow!("Invalid identity line {value:?}"));
        }

        let zone = parts[0];
        let epoch = parts[1]
            .parse::<i64>()
            .map_err(|_| anyhow::anyhow!("Invalid identity timestamp {:?}", parts[1]))?;
        let name_email = parts[2];

        let email_start = name_email
            .find('<')
            .ok_or_else(|| anyhow::anyhow!("Invalid identity line: missing '<'"))?;
        let email_end = name_email
            .find('>')
            .ok_or_else(|| anyhow::anyhow!("Invalid identity line: missing '>'"))?;
        let name = name_email[..email_start].trim().to_string();
        let email = name_email[email_start + 1..email_end].to_string();

        let offset = parse_zone(zone)?;
        let timestamp = chrono::DateTime::from_timestamp(epoch, 0)
            .ok_or_else(|| anyhow::anyhow!("Invalid identity timestamp {epoch}"))?
            .with_timezone(&offset);

        Ok(Author {
            name,
            email,
            timestamp,
        })
    }
}

/// Parse a `±hhmm` zone suffix into a fixed offset.
fn parse_zone(zone: &str) -> anyhow::Result<chrono::FixedOffset> {
    let bytes = zone.as_bytes();
    if bytes.len() != 5 || (bytes[0] != b'+' && bytes[0] != b'-') {
        return Err(anyhow::anyhow!("Invalid timezone {zone:?}"));
    }
    let hours = zone[1..3]
        .parse::<i32>()
        .map_err(|_| anyhow::anyhow!("Invalid timezone {zone:?}"))?;
    let minutes = zone[3..5]
        .parse::<i32>()
        .map_err(|_| anyhow::anyhow!("Invalid timezone {zone:?}"))?;
    let mut seconds = (hours * 60 + minutes) * 60;
    if bytes[0] == b'-' {
        seconds = -seconds;
    }
    chrono::FixedOffset::east_opt(seconds).ok_or_else(|| anyhow::anyhow!("Invalid timezone {zone:?}"))
}

/// Commit object: a tree snapshot plus history metadata.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    parents: Vec<ObjectId>,
    tree_oid: ObjectId,
    author: Author,
    committer: Author,
    message: String,
}

impl Commit {
    pub fn new(
        parents: Vec<ObjectId>,
        tree_oid: ObjectId,
        author: Author,
        committer: Author,
        message: String,
    ) -> Self {
        Commit {
            parents,
            tree_oid,
            author,
            committer,
            message,
        }
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn committer(&self) -> &Author {
        &self.committer
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// First line of the message, for short-form display.
    pub fn short_message(&self) -> String {
        self.message.lines().next().unwrap_or("").to_string()
    }
}

impl Packable for Commit {
    fn serialize_content(&self) -> anyhow::Result<Bytes> {
        let mut content = Vec::new();

        writeln!(content, "tree {}", self.tree_oid)?;
        for parent in &self.parents {
            writeln!(content, "parent {parent}")?;
        }
        writeln!(content, "author {}", self.author.to_external_string())?;
        writeln!(content, "committer {}", self.committer.to_external_string())?;
        writeln!(content)?;
        content.write_all(self.message.as_bytes())?;

        Ok(Bytes::from(content))
    }
}

impl Unpackable for Commit {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        let (headers, message) = content
            .split_once("\n\n")
            .context("Invalid commit object: missing message separator")?;
        let mut lines = headers.lines();

        let tree_line = lines
            .next()
            .context("Invalid commit object: missing tree line")?;
        let tree_oid = ObjectId::from_hex(
            tree_line
                .strip_prefix("tree ")
                .context("Invalid commit object: invalid tree line")?,
        )?;

        let mut parents = Vec::new();
        let mut next_line = lines
            .next()
            .context("Invalid commit object: missing author line")?;
        while let Some(parent_hex) = next_line.strip_prefix("parent ") {
            parents.push(ObjectId::from_hex(parent_hex)?);
            next_line = lines
                .next()
                .context("Invalid commit object: missing author line")?;
        }

        let author = Author::try_from(
            next_line
                .strip_prefix("author ")
                .context("Invalid commit object: invalid author line")?,
        )?;

        let committer_line = lines
            .next()
            .context("Invalid commit object: missing committer line")?;
        let committer = Author::try_from(
            committer_line
                .strip_prefix("committer ")
                .context("Invalid commit object: invalid committer line")?,
        )?;

        Ok(Commit {
            parents,
            tree_oid,
            author,
            committer,
            message: message.to_string(),
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }
}
