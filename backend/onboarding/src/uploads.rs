//! Upload sink: stores submitted artifacts under generated names in a flat
//! directory.
//!
//! Names follow `{owner}_{role}_{disambiguator}.{ext}`. Bytes are written to a
//! hidden `.part` file first and renamed into place, so an aborted write never
//! leaves a half-written artifact under its final name.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result};

/// Extensions accepted for proof-of-payment artifacts.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic", "pdf"];

const MAX_NAME_ATTEMPTS: usize = 4;

/// Logical purpose of an uploaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    CardRecto,
    CardVerso,
    Ticket,
    CompCardRecto,
    CompCardVerso,
    CompTicket,
    CryptoProof,
    FinalPhoto,
}

impl Role {
    pub fn tag(self) -> &'static str {
        match self {
            Self::CardRecto => "card_recto",
            Self::CardVerso => "card_verso",
            Self::Ticket => "ticket",
            Self::CompCardRecto => "comp_card_recto",
            Self::CompCardVerso => "comp_card_verso",
            Self::CompTicket => "comp_ticket",
            Self::CryptoProof => "crypto_proof",
            Self::FinalPhoto => "final_photo",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadSink {
    dir: PathBuf,
}

impl UploadSink {
    /// Open the sink, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` under a freshly generated name and return that name.
    ///
    /// `field` names the form field the file arrived in and is only used for
    /// validation messages.
    pub async fn store(
        &self,
        owner_id: &str,
        role: Role,
        field: &str,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let ext = accept(field, original_filename, bytes)?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = stored_name(owner_id, role, &ext);
            let target = self.dir.join(&name);
            if tokio::fs::try_exists(&target).await? {
                warn!(file = %name, "Upload name collision, drawing a new disambiguator");
                continue;
            }

            let partial = self.dir.join(format!(".{name}.part"));
            if let Err(e) = write_file(&partial, bytes).await {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e.into());
            }
            tokio::fs::rename(&partial, &target).await?;

            info!(owner = owner_id, role = role.tag(), file = %name, size = bytes.len(), "Artifact stored");
            return Ok(name);
        }

        Err(AppError::Conflict(
            "could not allocate a unique upload name".to_string(),
        ))
    }

    /// Remove artifacts that ended up unreferenced. Failures are only logged.
    pub async fn discard(&self, names: &[&str]) {
        for name in names.iter().filter(|n| is_plain_name(n)) {
            match tokio::fs::remove_file(self.dir.join(name)).await {
                Ok(()) => info!(file = %name, "Unreferenced artifact discarded"),
                Err(e) => warn!(file = %name, "Failed to discard artifact: {e}"),
            }
        }
    }
}

/// Validate an upload without storing it; returns the normalised extension.
pub fn accept(field: &str, original_filename: &str, bytes: &[u8]) -> Result<String> {
    let ext = extension_of(original_filename).ok_or_else(|| {
        AppError::validation(
            field,
            format!("file type not accepted; expected one of {ALLOWED_EXTENSIONS:?}"),
        )
    })?;
    if bytes.is_empty() {
        return Err(AppError::validation(field, "file is empty"));
    }
    Ok(ext)
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn stored_name(owner_id: &str, role: Role, ext: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{owner_id}_{}_{}.{ext}", role.tag(), &simple[..8])
}

/// Lower-cased extension of `filename`, if it is on the allow-list.
fn extension_of(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// A name is servable if it is a single plain path component.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
