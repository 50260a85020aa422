//! Configuration consumed by the object store core
//!
//! Only two knobs reach this layer: the deflate level used when writing
//! loose objects and the loose-object header convention. Parsing a
//! repository config file belongs to the surrounding repository code, which
//! fills this struct and hands it to [`crate::ObjectDatabase::open`].

/// Core settings for the object store.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Deflate level for loose object writes: `0..=9`, or `-1` for the
    /// zlib default.
    pub compression: i32,
    /// Emit the legacy loose format (one zlib stream starting with the
    /// ASCII header) instead of the packed-style header convention.
    /// Readers accept both regardless of this setting.
    pub use_legacy_headers: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            // speed over ratio; loose objects are usually short-lived
            compression: 1,
            use_legacy_headers: false,
        }
    }
}

impl CoreConfig {
    pub(crate) fn deflate_level(&self) -> flate2::Compression {
        match self.compression {
            n @ 0..=9 => flate2::Compression::new(n as u32),
            _ => flate2::Compression::default(),
        }
    }
}
