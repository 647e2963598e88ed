use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::tracker::Position;

/// Reads and writes the resume point in the format the original search tool
/// used: seven lines holding two 16-digit hex halves each (lookback tables,
/// then the cursor, high half first) and a final line with the record count.
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored position. A missing or empty file starts a fresh
    /// search; a present but unparseable file is an error.
    pub fn load(&self) -> Result<Position> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Position::fresh()),
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("Progress file {} should be readable.", self.path.display())
                })
            }
        };
        if text.trim().is_empty() {
            return Ok(Position::fresh());
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() != 15 {
            bail!(
                "Progress file {} should hold 15 fields, found {}.",
                self.path.display(),
                tokens.len()
            );
        }
        let mut fields = [0u64; 15];
        for (field, token) in fields.iter_mut().zip(&tokens) {
            *field = u64::from_str_radix(token, 16).with_context(|| {
                format!(
                    "Progress file {} should hold hex fields, found {token:?}.",
                    self.path.display()
                )
            })?;
        }

        let value = |index: usize| (fields[2 * index] as u128) << 64 | fields[2 * index + 1] as u128;
        let count = fields[14];
        if count > u16::MAX as u64 {
            bail!(
                "Progress file {} should hold a 16-bit count, found {count:#x}.",
                self.path.display()
            );
        }

        Ok(Position {
            val0mod1off: [value(0), value(1), value(2)],
            val1mod6off: [value(3), value(4), value(5)],
            cur_value: value(6),
            cur_count: count as u16,
        })
    }

    pub fn save(&self, position: &Position) -> Result<()> {
        let mut text = String::new();
        for value in position
            .val0mod1off
            .iter()
            .chain(position.val1mod6off.iter())
            .chain(std::iter::once(&position.cur_value))
        {
            text.push_str(&format!(
                "{:016x} {:016x}\n",
                (value >> 64) as u64,
                *value as u64
            ));
        }
        text.push_str(&format!("{:04x}\n", position.cur_count));
        fs::write(&self.path, text)
            .with_context(|| format!("Progress file {} should be writable.", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.txt"));
        assert_eq!(store.load().unwrap(), Position::fresh());
    }

    #[test]
    fn empty_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.txt");
        fs::write(&path, "").unwrap();
        let store = ProgressStore::new(&path);
        assert_eq!(store.load().unwrap(), Position::fresh());
    }

    #[test]
    fn round_trips_any_position() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.txt"));

        let positions = [
            Position {
                cur_value: 0,
                cur_count: 0,
                val0mod1off: [0; 3],
                val1mod6off: [0; 3],
            },
            Position::fresh(),
            Position {
                cur_value: 0x0123_4567_89ab_cdef_1122_3344_5566_7783,
                cur_count: 0xffff,
                val0mod1off: [u128::MAX, 1, 0x8000_0000_0000_0000_0000_0000_0000_0000],
                val1mod6off: [7, 0, 0xdead_beef_0000_0001],
            },
        ];
        for position in positions {
            store.save(&position).unwrap();
            assert_eq!(store.load().unwrap(), position);
        }
    }

    #[test]
    fn writes_the_reference_layout() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.txt"));
        store
            .save(&Position {
                cur_value: 27,
                cur_count: 111,
                val0mod1off: [27, 0, 0],
                val1mod6off: [25, 0, 0],
            })
            .unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        let expected = "0000000000000000 000000000000001b\n\
                        0000000000000000 0000000000000000\n\
                        0000000000000000 0000000000000000\n\
                        0000000000000000 0000000000000019\n\
                        0000000000000000 0000000000000000\n\
                        0000000000000000 0000000000000000\n\
                        0000000000000000 000000000000001b\n\
                        006f\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn tolerates_arbitrary_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.txt");
        fs::write(
            &path,
            "0 b 0 0 0 0\n\n  0 0 0 0   0 0\n0 13\t5\n",
        )
        .unwrap();
        let position = ProgressStore::new(&path).load().unwrap();
        assert_eq!(position.val0mod1off, [11, 0, 0]);
        assert_eq!(position.cur_value, 0x13);
        assert_eq!(position.cur_count, 5);
    }

    #[test]
    fn rejects_short_and_garbled_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.txt");

        fs::write(&path, "0 0 0 0 0 0 0 0 0 0 0 0 0 3\n").unwrap();
        assert!(ProgressStore::new(&path).load().is_err());

        fs::write(&path, "0 0 0 0 0 0 0 0 0 0 0 0 0 3 zz\n").unwrap();
        assert!(ProgressStore::new(&path).load().is_err());

        fs::write(&path, "0 0 0 0 0 0 0 0 0 0 0 0 0 3 10000\n").unwrap();
        assert!(ProgressStore::new(&path).load().is_err());
    }
}
