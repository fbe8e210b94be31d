//! Binary artifact codec for fitted models and encoders
//!
//! # Format
//!
//! An artifact file is the `bincode` (v1 default options: little-endian,
//! fixed-width integers) encoding of [`ArtifactEnvelope`]:
//!
//! | field            | type              | value                                |
//! |------------------|-------------------|--------------------------------------|
//! | `magic`          | `[u8; 4]`         | `b"RRAF"`                            |
//! | `format_version` | `u16`             | [`ARTIFACT_FORMAT_VERSION`]          |
//! | `kind`           | `ArtifactKind`    | `Model` (0) or `Encoder` (1)         |
//! | `checksum`       | `String`          | BLAKE3 hex digest of `payload`       |
//! | `payload`        | `Vec<u8>`         | `bincode` bytes of the inner value   |
//!
//! Decoding checks every header field before touching the payload, so a
//! truncated or swapped file is rejected instead of misread.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::encoder::FeatureEncoder;
use crate::errors::{ForestError, Result};
use crate::forest::RandomForestModel;

pub const ARTIFACT_MAGIC: [u8; 4] = *b"RRAF";
pub const ARTIFACT_FORMAT_VERSION: u16 = 1;

/// What an artifact file contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Model,
    Encoder,
}

/// Framing written around every serialized artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub magic: [u8; 4],
    pub format_version: u16,
    pub kind: ArtifactKind,
    pub checksum: String,
    pub payload: Vec<u8>,
}

/// Values that can be stored as a binary artifact
pub trait Artifact: Serialize + DeserializeOwned {
    const KIND: ArtifactKind;

    /// Encode into the framed binary format
    fn to_artifact_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let envelope = ArtifactEnvelope {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            kind: Self::KIND,
            checksum: checksum_hex(&payload),
            payload,
        };
        Ok(bincode::serialize(&envelope)?)
    }

    /// Decode and verify framed bytes
    fn from_artifact_bytes(bytes: &[u8]) -> Result<Self> {
        decode_envelope(bytes, Self::KIND)
    }

    /// Write the artifact to `path`, creating missing parent directories.
    ///
    /// Bytes go to a sibling temp file first and are renamed into place,
    /// so readers never observe a partially written artifact.
    fn save(&self, path: &Path) -> Result<u64> {
        let bytes = self.to_artifact_bytes()?;
        write_atomic(path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_artifact_bytes(&bytes)
    }
}

impl Artifact for RandomForestModel {
    const KIND: ArtifactKind = ArtifactKind::Model;

    fn from_artifact_bytes(bytes: &[u8]) -> Result<Self> {
        let model: RandomForestModel = decode_envelope(bytes, Self::KIND)?;
        model.validate()?;
        Ok(model)
    }
}

impl Artifact for FeatureEncoder {
    const KIND: ArtifactKind = ArtifactKind::Encoder;
}

fn decode_envelope<T: DeserializeOwned>(bytes: &[u8], kind: ArtifactKind) -> Result<T> {
    let envelope: ArtifactEnvelope = bincode::deserialize(bytes)
        .map_err(|e| ForestError::InvalidArtifact(format!("unreadable envelope: {}", e)))?;

    if envelope.magic != ARTIFACT_MAGIC {
        return Err(ForestError::InvalidArtifact("bad magic".into()));
    }
    if envelope.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(ForestError::InvalidArtifact(format!(
            "unsupported format version {}",
            envelope.format_version
        )));
    }
    if envelope.kind != kind {
        return Err(ForestError::InvalidArtifact(format!(
            "expected {:?} artifact, found {:?}",
            kind, envelope.kind
        )));
    }
    if checksum_hex(&envelope.payload) != envelope.checksum {
        return Err(ForestError::InvalidArtifact("checksum mismatch".into()));
    }
    Ok(bincode::deserialize(&envelope.payload)?)
}

/// BLAKE3 hex digest of raw bytes
pub fn checksum_hex(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}
