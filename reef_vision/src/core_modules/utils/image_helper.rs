// THEORY:
// The I/O edge of the engine. Everything here touches the filesystem; nothing in
// the four pipeline stages does. Decoding normalizes any layout the `image` crate
// understands (grayscale, alpha, 16-bit, float) down to 8-bit RGB, which is the
// only representation the stages accept.

pub mod image_helper {
    use crate::error::{RectifyError, Result};
    use image::RgbImage;
    use std::path::{Path, PathBuf};

    /// Extensions recognized as candidate inputs, compared case-insensitively.
    pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tiff", "tif"];

    /// Decodes the image at `path` into 8-bit RGB.
    pub fn load(path: &Path) -> Result<RgbImage> {
        let decoded = image::open(path).map_err(|source| RectifyError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(decoded.to_rgb8())
    }

    /// Encodes `image` to `path`, picking the format from the extension.
    pub fn save(path: &Path, image: &RgbImage) -> Result<()> {
        image
            .save(path)
            .map_err(|source| RectifyError::EncodingFailure {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn is_supported_image(path: &Path) -> bool {
        path.extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|supported| extension.eq_ignore_ascii_case(supported))
            })
            .unwrap_or(false)
    }

    /// Lists the supported image files directly inside `input_dir`, sorted by name.
    pub fn collect_images(input_dir: &Path) -> Result<Vec<PathBuf>> {
        let io_error = |source| RectifyError::Io {
            path: input_dir.to_path_buf(),
            source,
        };

        let mut images = Vec::new();
        for entry in std::fs::read_dir(input_dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && is_supported_image(&path) {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }

    /// The destination for `input`: the same file name inside `output_dir`.
    pub fn output_path_for(input: &Path, output_dir: &Path) -> Result<PathBuf> {
        let file_name = input.file_name().ok_or_else(|| {
            RectifyError::invalid_image(format!("{} has no file name", input.display()))
        })?;
        Ok(output_dir.join(file_name))
    }
}
