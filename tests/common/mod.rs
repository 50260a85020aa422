#![allow(dead_code)]

pub mod fixtures;

use casket::{CoreConfig, ObjectDatabase};
use std::path::Path;

/// Open a database rooted inside a test temp dir.
pub fn open_database(dir: &assert_fs::TempDir) -> ObjectDatabase {
    ObjectDatabase::open(dir.path().join("objects"), CoreConfig::default())
        .expect("objects directory should be creatable")
}

pub fn open_database_with(dir: &assert_fs::TempDir, config: CoreConfig) -> ObjectDatabase {
    ObjectDatabase::open(dir.path().join("objects"), config)
        .expect("objects directory should be creatable")
}

/// Count leftover `tmp-obj-*` files in the objects directory.
pub fn temp_file_count(objects_dir: &Path) -> usize {
    std::fs::read_dir(objects_dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| entry.file_name().to_string_lossy().starts_with("tmp-obj-"))
                .count()
        })
        .unwrap_or(0)
}

/// Count loose object files across every fan-out directory.
pub fn loose_file_count(objects_dir: &Path) -> usize {
    let mut count = 0;
    let Ok(entries) = std::fs::read_dir(objects_dir) else {
        return 0;
    };
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit()) {
            count += std::fs::read_dir(entry.path())
                .map(|files| files.filter_map(Result::ok).count())
                .unwrap_or(0);
        }
    }
    count
}
