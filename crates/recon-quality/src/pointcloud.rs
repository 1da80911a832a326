//! Point-cloud and sparse-model headers
//!
//! Recovers point counts from artifact headers without touching the payload.

use recon_core::{LogSink, ReconError, ReconResult};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Upper bound on header size; a file without a terminator within this many
/// bytes is treated as malformed instead of being read to the end.
const MAX_HEADER_BYTES: usize = 64 * 1024;

const HEADER_TERMINATOR: &str = "end_header";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyHeader {
    /// `format` line, e.g. `binary_little_endian 1.0`.
    pub format: Option<String>,
    /// `(name, count)` for every `element` declaration, in order.
    pub elements: Vec<(String, u64)>,
    /// Bytes consumed up to and including the terminator line.
    pub header_len: usize,
}

impl PlyHeader {
    pub fn vertex_count(&self) -> Option<u64> {
        self.elements
            .iter()
            .find(|(name, _)| name == "vertex")
            .map(|(_, count)| *count)
    }
}

/// Reads header lines up to and including `end_header`.
pub fn read_ply_header(path: &Path) -> ReconResult<PlyHeader> {
    let file = File::open(path).map_err(|e| ReconError::io(path.display().to_string(), e))?;
    let mut reader = BufReader::new(file);

    let mut header = PlyHeader {
        format: None,
        elements: Vec::new(),
        header_len: 0,
    };
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .by_ref()
            .take((MAX_HEADER_BYTES - header.header_len + 1) as u64)
            .read_until(b'\n', &mut buf)
            .map_err(|e| ReconError::io(path.display().to_string(), e))?;
        if read == 0 {
            return Err(ReconError::malformed(path, "header terminator not found"));
        }
        header.header_len += read;
        if header.header_len > MAX_HEADER_BYTES {
            return Err(ReconError::malformed(
                path,
                format!("no {HEADER_TERMINATOR} within {MAX_HEADER_BYTES} bytes"),
            ));
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line == HEADER_TERMINATOR {
            return Ok(header);
        }

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("format") => header.format = Some(tokens.collect::<Vec<_>>().join(" ")),
            Some("element") => {
                let name = tokens.next().unwrap_or_default().to_string();
                let count = tokens
                    .next()
                    .and_then(|t| t.parse::<u64>().ok())
                    .ok_or_else(|| {
                        ReconError::malformed(path, format!("bad element declaration: {line}"))
                    })?;
                header.elements.push((name, count));
            }
            _ => {}
        }
    }
}

/// Vertex count declared in a PLY header.
///
/// Returns 0 and logs an error when the file is missing or the declaration
/// is absent or malformed. A 0 only means "reconstructed nothing" when the
/// caller has confirmed the file exists.
pub fn count_ply_vertices(path: &Path, sink: &dyn LogSink) -> u64 {
    let step = "point-count";
    if !path.exists() {
        sink.error(step, &format!("point cloud not found: {}", path.display()));
        return 0;
    }
    match read_ply_header(path) {
        Ok(header) => match header.vertex_count() {
            Some(count) => count,
            None => {
                sink.error(
                    step,
                    &format!("no 'element vertex' declaration in {}", path.display()),
                );
                0
            }
        },
        Err(e) => {
            sink.error(step, &format!("unable to read PLY header: {e}"));
            0
        }
    }
}

/// Leading little-endian `u64` of a binary sparse model file
/// (`points3D.bin`, `images.bin`, `cameras.bin`): the record count.
pub fn read_binary_model_count(path: &Path) -> ReconResult<u64> {
    let mut file = File::open(path).map_err(|e| ReconError::io(path.display().to_string(), e))?;
    let mut bytes = [0u8; 8];
    file.read_exact(&mut bytes)
        .map_err(|_| ReconError::malformed(path, "shorter than the 8-byte count header"))?;
    Ok(u64::from_le_bytes(bytes))
}
