use image::GenericImageView;

use crate::{errors::Error, Result};

/// An image that has been verified to decode, kept in its original encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// Sniff the format and fully decode once so malformed uploads never reach the backend.
pub fn decode_image(bytes: Vec<u8>) -> Result<DecodedImage> {
    if bytes.is_empty() {
        return Err(Error::ImageDecode("empty image payload".to_string()));
    }

    let format = image::guess_format(&bytes)
        .map_err(|e| Error::ImageDecode(format!("unrecognized image format: {e}")))?;
    let img = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| Error::ImageDecode(e.to_string()))?;
    let (width, height) = img.dimensions();

    Ok(DecodedImage {
        bytes,
        mime_type: format.to_mime_type().to_string(),
        width,
        height,
    })
}
