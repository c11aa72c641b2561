//! Storage of uploaded photos.
//!
//! One image per request, under the [`FIELD`] form field. Anything that
//! isn't PNG or JPEG is dropped without complaint. Accepted files are
//! written to the upload directory as `<10 random letters>-<client name>`.
//! A stored file that no handler [keeps](UploadedFile::keep) is deleted
//! again once the request has been answered.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, error, info, warn};
use tokio::{fs::File, io::AsyncWriteExt};

use crate::{auth::token::random_name, error::UploadError};

/// The form field carrying the photo.
pub const FIELD: &str = "photo";

pub const NAME_LENGTH: usize = 10;

pub const ACCEPTED_TYPES: [&str; 3] = ["image/png", "image/jpg", "image/jpeg"];

/// URL prefix the upload directory is served under.
pub const PUBLIC_PREFIX: &str = "/uploads/";

#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub generated_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub storage_path: PathBuf,
    /// Shared by every clone of the request's form.
    kept: Arc<AtomicBool>,
}

impl UploadedFile {
    /// Where the file can be fetched from, e.g. `/uploads/abcdefghij-house.png`.
    pub fn public_path(&self) -> String {
        format!("{}{}", PUBLIC_PREFIX, self.generated_name)
    }

    /// Mark the file as referenced, so it outlives the request.
    pub fn keep(&self) {
        self.kept.store(true, Ordering::Release);
    }

    pub fn is_kept(&self) -> bool {
        self.kept.load(Ordering::Acquire)
    }

    /// Delete the file unless a handler kept it.
    pub async fn discard_unless_kept(&self) {
        if self.is_kept() {
            return;
        }
        match tokio::fs::remove_file(&self.storage_path).await {
            Ok(()) => debug!("Discarded unused upload {}", self.generated_name),
            Err(err) => warn!(
                "Failed to discard unused upload {}: {}",
                self.storage_path.display(),
                err
            ),
        }
    }
}

pub fn accepts(mime_type: &str) -> bool {
    ACCEPTED_TYPES.contains(&mime_type)
}

/// `<random letters>-<basename of the client's file name>`.
pub fn stored_name(original_name: &str) -> String {
    // Clients may send a full path; only the last component is kept.
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    format!("{}-{}", random_name(NAME_LENGTH), base)
}

#[derive(Clone, Debug)]
pub struct Uploads {
    dir: PathBuf,
}

impl Uploads {
    pub fn new(dir: impl Into<PathBuf>) -> Uploads {
        Uploads { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stream a multipart field to disk. A partially written file is removed
    /// again if anything goes wrong.
    pub async fn store(
        &self,
        mut field: multer::Field<'static>,
        mime_type: String,
    ) -> Result<UploadedFile, UploadError> {
        let original_name = field.file_name().unwrap_or_default().to_string();
        let generated_name = stored_name(&original_name);
        let storage_path = self.dir.join(&generated_name);

        let written = async {
            let mut file = File::create(&storage_path).await?;
            while let Some(chunk) = field.chunk().await? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<_, UploadError>(())
        }
        .await;

        if let Err(err) = written {
            error!("Failed to store upload {}: {}", storage_path.display(), err);
            if let Err(err) = tokio::fs::remove_file(&storage_path).await {
                debug!("No partial upload to clean up: {}", err);
            }
            return Err(err);
        }

        info!("Stored upload {} as {}", original_name, generated_name);
        Ok(UploadedFile {
            generated_name,
            original_name,
            mime_type,
            storage_path,
            kept: Arc::default(),
        })
    }

    /// Delete a stored file given its public path. Missing files are only logged.
    pub async fn remove(&self, public_path: &str) {
        let Some(name) = public_path
            .strip_prefix(PUBLIC_PREFIX)
            .and_then(|name| Path::new(name).file_name())
        else {
            warn!("Not removing {}: not an upload", public_path);
            return;
        };

        let path = self.dir.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed upload {}", path.display()),
            Err(err) => warn!("Failed to remove upload {}: {}", path.display(), err),
        }
    }
}
