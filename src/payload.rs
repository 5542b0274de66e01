use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use serde_json::Value;

use crate::{error::AppError, models::Record};

/// One file part of a multipart submission.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// The multipart part name, e.g. `image`.
    pub part: String,
    pub file_name: String,
    pub bytes: Bytes,
}

/// EntityPayload
///
/// The body of an admin create or update request, accepted either as a JSON object
/// or as `multipart/form-data`. Multipart text parts become string values (coerced
/// later against the schema); a repeated part name collects into an array. File
/// parts are kept aside for the storage layer.
#[derive(Debug, Default)]
pub struct EntityPayload {
    pub fields: Record,
    pub files: Vec<UploadedFile>,
}

impl EntityPayload {
    pub fn file(&self, part: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.part == part)
    }
}

fn push_field(fields: &mut Record, name: String, value: Value) {
    match fields.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(name, value);
        }
    }
}

impl<S> FromRequest<S> for EntityPayload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Json(body) = Json::<Value>::from_request(req, state)
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            return match body {
                Value::Object(fields) => Ok(Self { fields, files: Vec::new() }),
                _ => Err(AppError::Validation("Request body must be a JSON object".into())),
            };
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        let mut payload = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_owned) {
                Some(file_name) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::Validation(e.body_text()))?;
                    // Browsers send an empty, unnamed part for an untouched file input.
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    payload.files.push(UploadedFile { part: name, file_name, bytes });
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(e.body_text()))?;
                    push_field(&mut payload.fields, name, Value::String(text));
                }
            }
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde_json::json;

    #[tokio::test]
    async fn json_object_becomes_fields() {
        let req = Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title":"A","display_order":2}"#))
            .unwrap();
        let payload = EntityPayload::from_request(req, &()).await.unwrap();
        assert_eq!(payload.fields["title"], json!("A"));
        assert!(payload.files.is_empty());
    }

    #[tokio::test]
    async fn json_array_is_rejected() {
        let req = Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("[1,2]"))
            .unwrap();
        let err = EntityPayload::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn multipart_collects_text_files_and_repeats() {
        let body = "--X\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\nHello\r\n\
            --X\r\n\
            Content-Disposition: form-data; name=\"features\"\r\n\r\nOne\r\n\
            --X\r\n\
            Content-Disposition: form-data; name=\"features\"\r\n\r\nTwo\r\n\
            --X\r\n\
            Content-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\n\
            Content-Type: image/png\r\n\r\nPNGDATA\r\n\
            --X--\r\n";
        let req = Request::builder()
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=X")
            .body(Body::from(body))
            .unwrap();

        let payload = EntityPayload::from_request(req, &()).await.unwrap();
        assert_eq!(payload.fields["title"], json!("Hello"));
        assert_eq!(payload.fields["features"], json!(["One", "Two"]));
        let image = payload.file("image").unwrap();
        assert_eq!(image.file_name, "a.png");
        assert_eq!(&image.bytes[..], b"PNGDATA");
    }
}
