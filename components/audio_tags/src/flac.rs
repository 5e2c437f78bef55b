use crate::TagError;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"fLaC";
const LAST_BLOCK: u8 = 0x80;
const PADDING: u8 = 1;

/// Padding given to a stream that has none
pub const DEFAULT_PADDING: u32 = 1024;

#[derive(Debug)]
struct BlockHeader {
    offset: u64,
    kind: u8,
    len: u32,
}

impl BlockHeader {
    fn end(&self) -> u64 {
        self.offset + 4 + u64::from(self.len)
    }
}

/// Metadata block headers of a bare FLAC stream, `None` for anything else
fn block_headers(reader: &mut (impl Read + Seek)) -> io::Result<Option<Vec<BlockHeader>>> {
    let mut magic = [0u8; 4];
    match reader.read_exact(&mut magic) {
        Ok(()) if &magic == MAGIC => {}
        Ok(()) => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let mut headers = Vec::new();
    let mut offset = MAGIC.len() as u64;
    loop {
        let mut raw = [0u8; 4];
        reader.read_exact(&mut raw)?;
        let header = BlockHeader {
            offset,
            kind: raw[0] & !LAST_BLOCK,
            len: u32::from_be_bytes([0, raw[1], raw[2], raw[3]]),
        };
        offset = header.end();
        reader.seek(SeekFrom::Start(offset))?;
        headers.push(header);
        if raw[0] & LAST_BLOCK != 0 {
            return Ok(Some(headers));
        }
    }
}

/// Give a FLAC stream a PADDING block if it has none.
///
/// lofty 0.18 writes the new metadata of an unpadded stream over the start
/// of its audio frames, so streams are normalised before tags are touched.
/// Returns whether the file was rewritten. Files that do not start with the
/// FLAC marker (including FLAC behind an ID3v2 tag) are left alone.
pub fn ensure_padding(path: &Path) -> Result<bool, TagError> {
    let mut source = BufReader::new(File::open(path)?);
    let Some(headers) = block_headers(&mut source)? else {
        return Ok(false);
    };
    if headers.iter().any(|h| h.kind == PADDING) {
        return Ok(false);
    }
    let Some(last) = headers.last() else {
        return Ok(false);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::Builder::new()
        .prefix(".pad-")
        .suffix(".flac")
        .tempfile_in(dir)?;

    {
        let mut metadata = vec![0u8; last.end() as usize];
        source.seek(SeekFrom::Start(0))?;
        source.read_exact(&mut metadata)?;
        metadata[last.offset as usize] &= !LAST_BLOCK;

        let mut out = BufWriter::new(staged.as_file_mut());
        out.write_all(&metadata)?;
        let len = DEFAULT_PADDING.to_be_bytes();
        out.write_all(&[LAST_BLOCK | PADDING, len[1], len[2], len[3]])?;
        out.write_all(&[0u8; DEFAULT_PADDING as usize])?;
        io::copy(&mut source, &mut out)?;
        out.flush()?;
    }
    drop(source);

    fs::set_permissions(staged.path(), fs::metadata(path)?.permissions())?;
    staged.persist(path).map_err(|e| e.error)?;
    tracing::debug!(path = %path.display(), "added padding to flac stream");
    Ok(true)
}
