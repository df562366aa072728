//! Local checks on meal photos before they are sent anywhere.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::InputRejection;

pub(crate) const MIN_IMAGE_BYTES: usize = 1024;
pub(crate) const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// Image format accepted by the vision endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// A data URI that passed every pre-flight check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ValidatedImage {
    pub(crate) kind: ImageKind,
    pub(crate) decoded_len: usize,
    payload: String,
}

impl ValidatedImage {
    /// Data URI with a normalized MIME type, ready to embed in a prompt.
    pub(crate) fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.kind.mime(), self.payload)
    }
}

/// Validates `data:image/{jpeg|png};base64,<payload>`.
pub(crate) fn validate_image(data: &str) -> Result<ValidatedImage, InputRejection> {
    let data = data.trim();
    if data.is_empty() {
        return Err(InputRejection::MissingImage);
    }

    let rest = data
        .strip_prefix("data:")
        .ok_or(InputRejection::UnsupportedFormat)?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or(InputRejection::UnsupportedFormat)?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or(InputRejection::UnsupportedFormat)?;
    let kind = ImageKind::from_mime(mime).ok_or(InputRejection::UnsupportedFormat)?;

    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if payload.is_empty() {
        return Err(InputRejection::MissingImage);
    }
    // base64 never decodes to more than 3 bytes per 4 characters
    if payload.len() / 4 * 3 > MAX_IMAGE_BYTES + 2 {
        return Err(InputRejection::TooLarge);
    }
    let decoded = BASE64
        .decode(payload.as_bytes())
        .map_err(|_| InputRejection::InvalidEncoding)?;

    if decoded.len() > MAX_IMAGE_BYTES {
        return Err(InputRejection::TooLarge);
    }
    if decoded.len() < MIN_IMAGE_BYTES {
        return Err(InputRejection::TooSmall);
    }

    Ok(ValidatedImage {
        kind,
        decoded_len: decoded.len(),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    use super::{validate_image, ImageKind, MAX_IMAGE_BYTES, MIN_IMAGE_BYTES};
    use crate::InputRejection;

    fn data_uri(mime: &str, len: usize) -> String {
        format!("data:{mime};base64,{}", BASE64.encode(vec![7u8; len]))
    }

    #[test]
    fn accepts_jpeg_and_png_within_bounds() {
        let jpeg = validate_image(&data_uri("image/jpeg", 2_048)).expect("jpeg must pass");
        assert_eq!(jpeg.kind, ImageKind::Jpeg);
        assert_eq!(jpeg.decoded_len, 2_048);

        let png = validate_image(&data_uri("image/png", MIN_IMAGE_BYTES)).expect("png must pass");
        assert_eq!(png.kind, ImageKind::Png);
    }

    #[test]
    fn jpg_alias_is_normalized() {
        let image = validate_image(&data_uri("image/jpg", 4_096)).expect("jpg alias must pass");
        assert!(image.data_uri().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn rejects_missing_payload() {
        assert_eq!(validate_image(""), Err(InputRejection::MissingImage));
        assert_eq!(validate_image("   "), Err(InputRejection::MissingImage));
        assert_eq!(
            validate_image("data:image/png;base64,"),
            Err(InputRejection::MissingImage)
        );
    }

    #[test]
    fn rejects_other_formats_and_bare_base64() {
        assert_eq!(
            validate_image(&data_uri("image/gif", 2_048)),
            Err(InputRejection::UnsupportedFormat)
        );
        assert_eq!(
            validate_image(&data_uri("image/webp", 2_048)),
            Err(InputRejection::UnsupportedFormat)
        );
        assert_eq!(
            validate_image(&BASE64.encode(vec![1u8; 2_048])),
            Err(InputRejection::UnsupportedFormat)
        );
        assert_eq!(
            validate_image("data:image/png,rawbytes"),
            Err(InputRejection::UnsupportedFormat)
        );
    }

    #[test]
    fn rejects_invalid_base64() {
        assert_eq!(
            validate_image("data:image/png;base64,@@not-base64@@"),
            Err(InputRejection::InvalidEncoding)
        );
    }

    #[test]
    fn enforces_size_bounds() {
        assert_eq!(
            validate_image(&data_uri("image/png", 500)),
            Err(InputRejection::TooSmall)
        );
        assert_eq!(
            validate_image(&data_uri("image/png", MIN_IMAGE_BYTES - 1)),
            Err(InputRejection::TooSmall)
        );
        assert_eq!(
            validate_image(&data_uri("image/jpeg", MAX_IMAGE_BYTES + 1)),
            Err(InputRejection::TooLarge)
        );
        assert!(validate_image(&data_uri("image/jpeg", MAX_IMAGE_BYTES)).is_ok());
    }

    #[test]
    fn oversized_payload_is_rejected_before_decoding() {
        // the trailing '!' is invalid base64, so decoding would report
        // InvalidEncoding
        let mut payload = "A".repeat(MAX_IMAGE_BYTES / 3 * 4 + 16);
        payload.push('!');
        assert_eq!(
            validate_image(&format!("data:image/png;base64,{payload}")),
            Err(InputRejection::TooLarge)
        );
    }
}
