//! Binary layout of an entry record file
//!
//! All integers are big-endian:
//!
//! ```text
//! [u64 key length][key bytes]
//! [i64 create time][i64 access time]
//! [u64 metadata length][metadata bytes]
//! [i32 path length, -1 for none][path bytes]
//! ```
//!
//! Key and metadata are framed by writing a zero length, streaming the body
//! through its serializer and then seeking back to patch the real length.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::cache::tier::disk::metadata::MetaData;
use crate::cache::traits::{CacheOperationError, CacheResult, JsonSerializer, Serializer};

/// Decoded content of one record file
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRecord<K> {
    pub key: K,
    pub create_time: i64,
    pub access_time: i64,
    pub metadata: MetaData,
    pub file: Option<PathBuf>,
}

impl<K> EntryRecord<K> {
    /// Write the record to `path`, truncating whatever was there
    pub fn save(&self, path: &Path, key_serializer: &dyn Serializer<K>) -> CacheResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut out = BufWriter::new(file);

        write_framed(&mut out, |writer| key_serializer.save(writer, &self.key))?;
        out.write_all(&self.create_time.to_be_bytes())?;
        out.write_all(&self.access_time.to_be_bytes())?;
        write_framed(&mut out, |writer| {
            JsonSerializer::<MetaData>::new().save(writer, &self.metadata)
        })?;

        match &self.file {
            None => out.write_all(&(-1i32).to_be_bytes())?,
            Some(file) => {
                let bytes = file.to_str().ok_or_else(|| {
                    CacheOperationError::serialization_failed(format!(
                        "payload path {:?} is not valid UTF-8",
                        file
                    ))
                })?;
                let length = i32::try_from(bytes.len()).map_err(|_| {
                    CacheOperationError::serialization_failed("payload path is too long")
                })?;
                out.write_all(&length.to_be_bytes())?;
                out.write_all(bytes.as_bytes())?;
            }
        }

        let file = out.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        Ok(())
    }

    /// Read a record back from `path`
    ///
    /// Lengths pointing past the end of the file are reported as corruption.
    pub fn load(path: &Path, key_serializer: &dyn Serializer<K>) -> CacheResult<Self> {
        let file = File::open(path)?;
        let file_length = file.metadata()?.len();
        let mut input = BufReader::new(file);
        let mut position = 0u64;

        let key = read_framed(&mut input, &mut position, file_length, "key", |reader| {
            key_serializer.load(reader)
        })?;
        let create_time = i64::from_be_bytes(read_array(&mut input, &mut position)?);
        let access_time = i64::from_be_bytes(read_array(&mut input, &mut position)?);
        let metadata = read_framed(&mut input, &mut position, file_length, "metadata", |reader| {
            JsonSerializer::<MetaData>::new().load(reader)
        })?;

        let path_length = i32::from_be_bytes(read_array(&mut input, &mut position)?);
        let file = match path_length {
            -1 => None,
            length if length < 0 => {
                return Err(CacheOperationError::corrupted(format!(
                    "negative payload path length {} in {:?}",
                    length, path
                )));
            }
            length => {
                let length = length as u64;
                check_remaining(position, length, file_length, "payload path")?;
                let mut bytes = vec![0u8; length as usize];
                input.read_exact(&mut bytes)?;
                let text = String::from_utf8(bytes).map_err(|e| {
                    CacheOperationError::corrupted(format!("payload path is not UTF-8: {}", e))
                })?;
                Some(PathBuf::from(text))
            }
        };

        Ok(Self {
            key,
            create_time,
            access_time,
            metadata,
            file,
        })
    }
}

fn write_framed<W, F>(out: &mut W, body: F) -> CacheResult<()>
where
    W: Write + Seek,
    F: FnOnce(&mut dyn Write) -> CacheResult<()>,
{
    let length_position = out.stream_position()?;
    out.write_all(&0u64.to_be_bytes())?;
    let body_position = out.stream_position()?;

    body(out)?;

    let end_position = out.stream_position()?;
    out.seek(SeekFrom::Start(length_position))?;
    out.write_all(&(end_position - body_position).to_be_bytes())?;
    out.seek(SeekFrom::Start(end_position))?;
    Ok(())
}

fn read_framed<R, T, F>(
    input: &mut R,
    position: &mut u64,
    file_length: u64,
    what: &str,
    body: F,
) -> CacheResult<T>
where
    R: Read,
    F: FnOnce(&mut dyn Read) -> CacheResult<T>,
{
    let length = u64::from_be_bytes(read_array(input, position)?);
    check_remaining(*position, length, file_length, what)?;

    let mut limited = input.take(length);
    let value = body(&mut limited)?;
    // the serializer may stop short of the frame end
    io::copy(&mut limited, &mut io::sink())?;

    *position += length;
    Ok(value)
}

fn read_array<R: Read, const N: usize>(input: &mut R, position: &mut u64) -> CacheResult<[u8; N]> {
    let mut bytes = [0u8; N];
    input.read_exact(&mut bytes)?;
    *position += N as u64;
    Ok(bytes)
}

fn check_remaining(position: u64, length: u64, file_length: u64, what: &str) -> CacheResult<()> {
    if length > file_length.saturating_sub(position) {
        return Err(CacheOperationError::corrupted(format!(
            "{} length {} exceeds record size {}",
            what, length, file_length
        )));
    }
    Ok(())
}
