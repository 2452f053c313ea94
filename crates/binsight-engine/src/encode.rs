use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;

use crate::error::DetectError;

/// Encodes raw capture bytes as a self-contained data URI, ready to embed in
/// a JSON request body. Total over arbitrary binary input: unrecognized
/// formats are still encoded, with a generic media type.
pub fn encode_image(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", sniff_media_type(bytes), BASE64.encode(bytes))
}

/// Recovers the original bytes from a data URI. Used by the dry-run path and
/// to check the round-trip guarantee.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, DetectError> {
    let payload = uri
        .split_once(";base64,")
        .map(|(_, payload)| payload)
        .ok_or_else(|| DetectError::MalformedResponse("not a base64 data URI".to_string()))?;
    BASE64
        .decode(payload.as_bytes())
        .map_err(|err| DetectError::MalformedResponse(format!("data URI decode failed: {err}")))
}

fn sniff_media_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(_) | Err(_) => "application/octet-stream",
    }
}
