use std::path::PathBuf;
use tracing::{debug, warn};
use yatube_common::form::ValidImage;

/// Directory under the media root that post images are written to.
pub const POST_IMAGE_DIR: &str = "posts";

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes the image under a fresh random name and returns its path
    /// relative to the media root.
    pub async fn save_post_image(&self, image: &ValidImage) -> std::io::Result<String> {
        let name: u128 = rand::random();
        let relative = format!("{POST_IMAGE_DIR}/{name:032x}.{}", image.kind.extension());

        tokio::fs::create_dir_all(self.root.join(POST_IMAGE_DIR)).await?;
        tokio::fs::write(self.root.join(&relative), &image.bytes).await?;

        debug!(path = %relative, bytes = image.bytes.len(), "Stored post image");
        Ok(relative)
    }

    /// Deletes an image written by [`Self::save_post_image`] that ended up
    /// unreferenced.
    pub async fn remove(&self, relative: &str) {
        match tokio::fs::remove_file(self.root.join(relative)).await {
            Ok(()) => debug!(path = %relative, "Removed unreferenced image"),
            Err(err) => warn!(path = %relative, error = %err, "Removing image failed"),
        }
    }
}
