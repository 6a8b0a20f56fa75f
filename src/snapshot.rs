//! Plain-text snapshots.
//!
//! ```text
//! <capacity>
//! <bucket>|<key>:<value>
//! ...
//! ```
//!
//! Integers are written bare, text double-quoted without escaping. Records
//! follow bucket order, then chain order. Readers re-insert every record
//! through [`HashTable::insert`], so the restored layout follows the reader's
//! own growth rather than the bucket indices on disk.

use crate::error::{DeserializeError, Error, RecordError, Result, SerializeError};
use crate::hash_table::HashTable;
use crate::value::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// First record that could not be parsed.
#[derive(Debug, PartialEq, Eq)]
pub struct MalformedRecord {
    /// 1-based line number; line 1 is the capacity header.
    pub line: usize,
    pub reason: RecordError,
}

/// Outcome of reading snapshot records.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records inserted before the end of data.
    pub records: usize,

    /// Set when reading stopped at a malformed line instead of end of stream.
    /// Records before it remain inserted.
    pub malformed: Option<MalformedRecord>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.malformed.is_none()
    }
}

/// Reads one `\n`-terminated line into `buf`. Returns `false` at end of stream.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    buf.clear();
    Ok(reader.read_until(b'\n', buf)? > 0)
}

fn parse_header(line: &[u8]) -> Result<usize> {
    let invalid = || DeserializeError::InvalidHeader(String::from_utf8_lossy(line).into_owned());
    let text = std::str::from_utf8(line).map_err(|_| invalid())?;
    match text.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid().into()),
    }
}

fn read_header<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<usize> {
    if !read_line(reader, buf)? {
        return Err(DeserializeError::MissingHeader.into());
    }
    parse_header(buf)
}

fn parse_value(raw: &str) -> std::result::Result<Value, RecordError> {
    if let Some(body) = raw.strip_prefix('"') {
        return body
            .strip_suffix('"')
            .map(Value::from)
            .ok_or(RecordError::UnterminatedText);
    }
    raw.parse::<i64>()
        .map(Value::Integer)
        .map_err(RecordError::InvalidInteger)
}

/// Splits `<bucket>|<key>:<value>`. The bucket index is validated but only
/// informational.
pub(crate) fn parse_record(line: &str) -> std::result::Result<(usize, i64, Value), RecordError> {
    let (bucket, rest) = line
        .split_once('|')
        .ok_or(RecordError::MissingBucketSeparator)?;
    let bucket = bucket.parse::<usize>().map_err(RecordError::InvalidBucket)?;
    let (key, value) = rest
        .split_once(':')
        .ok_or(RecordError::MissingValueSeparator)?;
    let key = key.parse::<i64>().map_err(RecordError::InvalidKey)?;
    Ok((bucket, key, parse_value(value)?))
}

impl HashTable {
    /// Writes the snapshot to `writer`.
    ///
    /// Fails before writing anything if a text value holds a line break.
    pub fn write_snapshot<W: Write>(&self, writer: &mut W) -> Result<()> {
        if let Some((_, key, _)) = self.iter().find(|(_, _, v)| !v.is_line_safe()) {
            return Err(SerializeError::UnrepresentableText { key }.into());
        }

        writeln!(writer, "{}", self.capacity())?;
        for (bucket, key, value) in self {
            writeln!(writer, "{bucket}|{key}:{value}")?;
        }
        Ok(())
    }

    /// Atomically writes the snapshot to `path`.
    ///
    /// The snapshot goes to a temporary file next to `path` which then
    /// replaces it, so a failed save leaves any previous file untouched.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let folder = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
        {
            let mut writer = BufWriter::new(temp_file.as_file_mut());
            self.write_snapshot(&mut writer)?;
            writer.flush()?;
        }
        temp_file.as_file().sync_all()?;
        temp_file.persist(path)?;

        log::debug!(
            "Saved {} entries ({} buckets) to {path:?}",
            self.len(),
            self.capacity()
        );
        Ok(())
    }

    /// Builds a fresh table from a snapshot stream, using the declared
    /// capacity as its initial capacity.
    ///
    /// A malformed record ends the read; the table holds every record before
    /// it and the report says where reading stopped.
    ///
    /// A declared capacity too large to allocate is reported as an invalid
    /// header rather than aborting.
    pub fn read_snapshot<R: BufRead>(mut reader: R) -> Result<(Self, LoadReport)> {
        let mut buf = Vec::new();
        let capacity = read_header(&mut reader, &mut buf)?;
        let mut table = Self::try_with_capacity(capacity)
            .map_err(|_| DeserializeError::InvalidHeader(capacity.to_string()))?;
        let report = table.insert_records(reader, buf)?;
        Ok((table, report))
    }

    /// Appends the records of a snapshot stream to this table. The declared
    /// capacity is checked but this table keeps its own.
    pub fn extend_from_snapshot<R: BufRead>(&mut self, mut reader: R) -> Result<LoadReport> {
        let mut buf = Vec::new();
        read_header(&mut reader, &mut buf)?;
        self.insert_records(reader, buf)
    }

    /// Opens `path` and reads it with [`HashTable::read_snapshot`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<(Self, LoadReport)> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let (table, report) = Self::read_snapshot(BufReader::new(file))?;

        log::debug!(
            "Loaded {} records from {path:?} into {} buckets",
            report.records,
            table.capacity()
        );
        Ok((table, report))
    }

    /// Inserts records until end of stream or the first malformed line.
    /// Only failures of the reader itself are returned as errors.
    fn insert_records<R: BufRead>(&mut self, mut reader: R, mut buf: Vec<u8>) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        // Line 1 was the header.
        let mut line_no = 1;
        while read_line(&mut reader, &mut buf).map_err(Error::Io)? {
            line_no += 1;
            let parsed = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => parse_record(line.trim()),
                Err(e) => Err(RecordError::InvalidUtf8(e)),
            };

            match parsed {
                Ok((_, key, value)) => {
                    self.insert(key, value);
                    report.records += 1;
                }
                Err(reason) => {
                    log::warn!("Stopping snapshot read at line {line_no}: {reason}");
                    report.malformed = Some(MalformedRecord {
                        line: line_no,
                        reason,
                    });
                    break;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn snapshot_string(m: &HashTable) -> String {
        let mut buf = Vec::new();
        m.write_snapshot(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn writes_header_then_records_in_bucket_order() {
        let mut m = HashTable::with_capacity(100).unwrap();
        m.insert(7, Value::from("example_value"));
        m.insert(5, Value::Integer(9));
        m.insert(305, Value::Integer(78));
        m.insert(-3, Value::Integer(-4));

        assert_eq!(
            snapshot_string(&m),
            "100\n5|5:9\n5|305:78\n7|7:\"example_value\"\n97|-3:-4\n"
        );
    }

    #[test]
    fn empty_table_writes_only_header() {
        let m = HashTable::with_capacity(3).unwrap();
        assert_eq!(snapshot_string(&m), "3\n");

        let (restored, report) = HashTable::read_snapshot("3\n".as_bytes()).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.capacity(), 3);
        assert_eq!(report, LoadReport::default());
    }

    #[test]
    fn parse_record_variants() {
        assert_eq!(parse_record("3|7:\"x\""), Ok((3, 7, Value::from("x"))));
        assert_eq!(parse_record("0|-5:-12"), Ok((0, -5, Value::Integer(-12))));
        assert_eq!(parse_record("0|1:+12"), Ok((0, 1, Value::Integer(12))));
        assert_eq!(parse_record("1|1:\"\""), Ok((1, 1, Value::from(""))));
        assert_eq!(
            parse_record("1|1:\"a|b:c \"d\"\""),
            Ok((1, 1, Value::from("a|b:c \"d\"")))
        );

        assert_eq!(
            parse_record("7:1"),
            Err(RecordError::MissingBucketSeparator)
        );
        assert_eq!(parse_record("1|7"), Err(RecordError::MissingValueSeparator));
        assert_eq!(parse_record("1|7:\"abc"), Err(RecordError::UnterminatedText));
        assert_eq!(parse_record("1|7:\""), Err(RecordError::UnterminatedText));
        assert!(matches!(
            parse_record("x|7:1"),
            Err(RecordError::InvalidBucket(_))
        ));
        assert!(matches!(
            parse_record("1|k:1"),
            Err(RecordError::InvalidKey(_))
        ));
        assert!(matches!(
            parse_record("1|7:12ab"),
            Err(RecordError::InvalidInteger(_))
        ));
    }

    /// Invariant: records before a malformed line stay inserted and the report
    /// names the line that stopped the read.
    #[test]
    fn malformed_record_stops_read() {
        let input = "8\n1|1:10\n2|2:\"two\"\nnot a record\n3|3:30\n";
        let (m, report) = HashTable::read_snapshot(input.as_bytes()).unwrap();

        assert_eq!(m.len(), 2);
        assert_eq!(m.lookup(1), Some(&Value::Integer(10)));
        assert_eq!(m.lookup(2), Some(&Value::from("two")));
        assert_eq!(m.lookup(3), None);

        assert_eq!(report.records, 2);
        assert!(!report.is_complete());
        assert_eq!(
            report.malformed,
            Some(MalformedRecord {
                line: 4,
                reason: RecordError::MissingBucketSeparator,
            })
        );
    }

    /// Invariant: a record that is not UTF-8 is malformed data; the records
    /// before it are kept.
    #[test]
    fn non_utf8_record_stops_read() {
        let input: &[u8] = b"8\n1|1:10\n2|2:\"two\"\n3|3:\"\xE9\"\n4|4:40\n";
        let (m, report) = HashTable::read_snapshot(input).unwrap();

        assert_eq!(m.len(), 2);
        assert_eq!(m.lookup(1), Some(&Value::Integer(10)));
        assert_eq!(m.lookup(2), Some(&Value::from("two")));
        assert_eq!(m.lookup(3), None);
        assert_eq!(m.lookup(4), None);

        assert_eq!(report.records, 2);
        let malformed = report.malformed.unwrap();
        assert_eq!(malformed.line, 4);
        assert!(matches!(malformed.reason, RecordError::InvalidUtf8(_)));
    }

    #[test]
    fn non_utf8_record_keeps_existing_entries_on_extend() {
        let mut m = HashTable::with_capacity(16).unwrap();
        m.insert(9, Value::Integer(9));
        let report = m
            .extend_from_snapshot(&b"4\n1|1:1\n\xFF\xFE\n"[..])
            .unwrap();
        assert_eq!(report.records, 1);
        assert!(matches!(
            report.malformed,
            Some(MalformedRecord {
                line: 3,
                reason: RecordError::InvalidUtf8(_),
            })
        ));
        assert_eq!(m.len(), 2);
    }

    /// Invariant: a declared capacity that cannot be allocated is rejected as
    /// a bad header instead of panicking or aborting.
    #[test]
    fn huge_header_is_invalid() {
        for header in ["18446744073709551615\n1|1:1\n", "4611686018427387904\n1|1:1\n"] {
            let res = std::panic::catch_unwind(|| HashTable::read_snapshot(header.as_bytes()));
            let res = res.expect("reading must not panic");
            assert!(matches!(
                res,
                Err(Error::Deserialize(DeserializeError::InvalidHeader(_)))
            ));
        }
    }

    #[test]
    fn blank_lines_and_crlf_are_tolerated() {
        let input = "4\r\n3|7:\"x\"\r\n\r\n3|11:2\r\n";
        let (m, report) = HashTable::read_snapshot(input.as_bytes()).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.records, 2);
        assert_eq!(m.lookup(7), Some(&Value::from("x")));
        assert_eq!(m.lookup(11), Some(&Value::Integer(2)));
    }

    #[test]
    fn header_errors() {
        assert!(matches!(
            HashTable::read_snapshot("".as_bytes()),
            Err(Error::Deserialize(DeserializeError::MissingHeader))
        ));
        assert!(matches!(
            HashTable::read_snapshot("0\n".as_bytes()),
            Err(Error::Deserialize(DeserializeError::InvalidHeader(_)))
        ));
        assert!(matches!(
            HashTable::read_snapshot("abc\n1|1:1\n".as_bytes()),
            Err(Error::Deserialize(DeserializeError::InvalidHeader(_)))
        ));
        assert!(matches!(
            HashTable::read_snapshot(&b"\xE9\n1|1:1\n"[..]),
            Err(Error::Deserialize(DeserializeError::InvalidHeader(_)))
        ));
    }

    /// Invariant: the declared capacity seeds the table, and reload growth
    /// follows the normal insert path.
    #[test]
    fn reload_regrows_from_declared_capacity() {
        let input = "2\n0|0:0\n1|1:1\n0|2:2\n";
        let (m, report) = HashTable::read_snapshot(input.as_bytes()).unwrap();
        assert!(report.is_complete());
        assert_eq!(m.len(), 3);
        assert_eq!(m.capacity(), 8);
        for k in 0..3 {
            assert_eq!(m.lookup(k), Some(&Value::Integer(k)));
        }
    }

    #[test]
    fn extend_keeps_own_capacity() {
        let mut m = HashTable::with_capacity(50).unwrap();
        m.insert(1, Value::from("existing"));
        let report = m
            .extend_from_snapshot("4\n1|1:\"loaded\"\n2|2:2\n".as_bytes())
            .unwrap();

        assert_eq!(report.records, 2);
        assert_eq!(m.capacity(), 50);
        assert_eq!(m.len(), 3);
        assert_eq!(
            m.lookup_all(1).cloned().collect::<Vec<_>>(),
            vec![Value::from("existing"), Value::from("loaded")]
        );
    }

    #[test]
    fn line_break_in_text_is_rejected_before_writing() {
        let mut m = HashTable::with_capacity(8).unwrap();
        m.insert(1, Value::Integer(1));
        m.insert(2, Value::from("two\nlines"));

        let mut buf = Vec::new();
        assert!(matches!(
            m.write_snapshot(&mut buf),
            Err(Error::Serialize(SerializeError::UnrepresentableText { key: 2 }))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn save_and_load_file() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("map_data.txt");

        let mut m = HashTable::with_capacity(4).unwrap();
        m.insert(7, Value::from("x"));
        m.insert(11, Value::Integer(2));
        m.save(&path)?;

        let (restored, report) = HashTable::load(&path)?;
        assert!(report.is_complete());
        assert_eq!(restored.capacity(), 4);
        assert_eq!(restored.lookup(7), Some(&Value::from("x")));
        assert_eq!(restored.lookup(11), Some(&Value::Integer(2)));
        Ok(())
    }

    #[test]
    fn failed_save_keeps_previous_file() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot.txt");

        let mut good = HashTable::with_capacity(4).unwrap();
        good.insert(1, Value::Integer(1));
        good.save(&path)?;

        let mut bad = HashTable::with_capacity(4).unwrap();
        bad.insert(2, Value::from("a\nb"));
        assert!(bad.save(&path).is_err());

        assert_eq!(std::fs::read_to_string(&path)?, "4\n1|1:1\n");
        Ok(())
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = HashTable::load(dir.path().join("does_not_exist.txt"));
        assert!(matches!(res, Err(Error::Io(_))));
    }

    #[test]
    fn save_into_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let m = HashTable::with_capacity(4).unwrap();
        let res = m.save(dir.path().join("missing").join("snapshot.txt"));
        assert!(matches!(res, Err(Error::Io(_))));
    }
}
