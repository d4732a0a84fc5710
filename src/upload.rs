use std::collections::HashMap;

use actix_multipart::Multipart;
use futures_util::TryStreamExt as _;

use crate::error::ApiError;

pub const ALLOWED_IMAGE_MIME: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

const MAX_TEXT_FIELD: usize = 4 * 1024;

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub extension: String,
}

/// Text fields plus at most one image from a `multipart/form-data` body.
#[derive(Debug, Default)]
pub struct ImageForm {
    pub fields: HashMap<String, String>,
    pub image: Option<UploadedImage>,
}

impl ImageForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }
}

/// Reads the whole form. The part named `file_field` is treated as the image:
/// it must fit in `max_bytes` and sniff as one of [`ALLOWED_IMAGE_MIME`].
pub async fn read_image_form(mut payload: Multipart, file_field: &str, max_bytes: usize) -> Result<ImageForm, ApiError> {
    let mut form = ImageForm::default();
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        tracing::warn!("multipart error: {e}");
        ApiError::bad_request("That upload got scrambled like an egg")
    })? {
        let Some(name) = field.content_disposition().get_name().map(str::to_string) else { continue };
        let limit = if name == file_field { max_bytes } else { MAX_TEXT_FIELD };
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            tracing::warn!("multipart stream read error: {e}");
            ApiError::bad_request("That upload got scrambled like an egg")
        })? {
            if bytes.len() + chunk.len() > limit {
                return Err(if name == file_field {
                    ApiError::PayloadTooLarge
                } else {
                    ApiError::bad_request(format!("Field '{name}' is too long"))
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        if name == file_field {
            if bytes.is_empty() {
                continue;
            }
            form.image = Some(inspect_image(bytes)?);
        } else {
            let text = String::from_utf8(bytes)
                .map_err(|_| ApiError::bad_request(format!("Field '{name}' must be text")))?;
            form.fields.insert(name, text);
        }
    }
    Ok(form)
}

/// Sniffs the content type from magic bytes; the client's declared type is ignored.
pub fn inspect_image(bytes: Vec<u8>) -> Result<UploadedImage, ApiError> {
    let kind = infer::get(&bytes)
        .filter(|t| ALLOWED_IMAGE_MIME.contains(&t.mime_type()))
        .ok_or_else(|| ApiError::UnsupportedMediaType("Only JPEG, PNG, GIF or WebP ducks, please".into()))?;
    Ok(UploadedImage { mime: kind.mime_type().to_string(), extension: kind.extension().to_string(), bytes })
}

/// Fresh media key such as `ducks/<uuid>.png`.
pub fn media_key(folder: &str, image: &UploadedImage) -> String {
    format!("{folder}/{}.{}", uuid::Uuid::new_v4(), image.extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 16] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R'];

    #[test]
    fn inspect_accepts_png_and_rejects_text() {
        let img = inspect_image(PNG_HEADER.to_vec()).unwrap();
        assert_eq!(img.mime, "image/png");
        assert_eq!(img.extension, "png");
        assert!(matches!(inspect_image(b"hello".to_vec()), Err(ApiError::UnsupportedMediaType(_))));
    }

    #[test]
    fn media_keys_are_unique_and_foldered() {
        let img = inspect_image(PNG_HEADER.to_vec()).unwrap();
        let a = media_key("ducks", &img);
        let b = media_key("ducks", &img);
        assert!(a.starts_with("ducks/") && a.ends_with(".png"));
        assert_ne!(a, b);
    }
}
