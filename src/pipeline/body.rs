use std::convert::Infallible;

use axum::{
    async_trait,
    body::{Body, HttpBody},
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, Request},
    response::IntoResponse,
};
use futures::{future::BoxFuture, FutureExt};
use log::{debug, trace};
use multer::{Constraints, Multipart, SizeLimit};

use super::{Flow, Stage};
use crate::{
    error::{AppError, UploadError},
    upload::{self, UploadedFile, Uploads},
};

/// A parsed form submission.
#[derive(Clone, Debug, Default)]
pub struct FormBody {
    pub fields: Vec<(String, String)>,
    /// Only present if an accepted image was uploaded.
    pub file: Option<UploadedFile>,
}

impl FormBody {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// A trimmed, non-empty field.
    pub fn require(&self, name: &'static str) -> Result<&str, AppError> {
        self.get(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AppError::MissingField(name))
    }

    /// A field parsed with [`str::parse`].
    pub fn parse<T: std::str::FromStr>(&self, name: &'static str) -> Result<T, AppError> {
        self.require(name)?
            .parse()
            .map_err(|_| AppError::InvalidField(name))
    }

    /// Whether a checkbox was ticked.
    pub fn checked(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for FormBody {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.remove::<FormBody>().unwrap_or_default())
    }
}

enum Encoding {
    UrlEncoded,
    Multipart(String),
}

impl Encoding {
    fn of(headers: &HeaderMap) -> Option<Encoding> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let essence = content_type.split(';').next()?.trim();

        if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            Some(Encoding::UrlEncoded)
        } else if essence.eq_ignore_ascii_case("multipart/form-data") {
            Some(Encoding::Multipart(content_type.to_string()))
        } else {
            None
        }
    }
}

/// Parses url-encoded and multipart bodies into a [`FormBody`] extension,
/// storing the uploaded photo on the way.
pub struct BodyStage {
    uploads: Uploads,
    limit: usize,
}

impl BodyStage {
    pub fn new(uploads: Uploads, limit: usize) -> BodyStage {
        BodyStage { uploads, limit }
    }

    async fn read_urlencoded(&self, mut body: Body) -> Result<FormBody, UploadError> {
        let mut bytes = Vec::new();
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|err| UploadError::Malformed(err.to_string()))?;
            if bytes.len() + chunk.len() > self.limit {
                return Err(UploadError::TooLarge { limit: self.limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        let fields = url::form_urlencoded::parse(&bytes).into_owned().collect();
        Ok(FormBody { fields, file: None })
    }

    async fn read_multipart(&self, body: Body, content_type: &str) -> Result<FormBody, UploadError> {
        let boundary = multer::parse_boundary(content_type)?;
        let stream = futures::stream::unfold(body, |mut body| async move {
            body.data().await.map(|chunk| (chunk, body))
        });
        let constraints =
            Constraints::new().size_limit(SizeLimit::new().whole_stream(self.limit as u64));
        let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

        let mut form = FormBody::default();
        let parsed = self.read_fields(&mut multipart, &mut form).await;

        if let Err(err) = parsed {
            // Don't leave an orphaned photo behind
            if let Some(file) = form.file.take() {
                self.uploads.remove(&file.public_path()).await;
            }
            return Err(err);
        }

        Ok(form)
    }

    async fn read_fields(
        &self,
        multipart: &mut Multipart<'static>,
        form: &mut FormBody,
    ) -> Result<(), UploadError> {
        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if field.file_name().is_none() {
                let value = field.text().await?;
                form.fields.push((name, value));
                continue;
            }

            if name != upload::FIELD || form.file.is_some() {
                return Err(UploadError::UnexpectedFile(name));
            }

            let mime_type = field
                .content_type()
                .map(|mime| mime.essence_str().to_string())
                .unwrap_or_default();

            if !upload::accepts(&mime_type) {
                debug!("Dropping upload of type {:?}", mime_type);
                while field.chunk().await?.is_some() {}
                continue;
            }

            form.file = Some(self.uploads.store(field, mime_type).await?);
        }

        Ok(())
    }
}

impl Stage for BodyStage {
    fn name(&self) -> &'static str {
        "body"
    }

    fn run(&self, mut request: Request<Body>) -> BoxFuture<'_, Flow> {
        async move {
            let Some(encoding) = Encoding::of(request.headers()) else {
                return Flow::Continue(request);
            };

            let declared = request
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<usize>().ok());
            if declared.is_some_and(|length| length > self.limit) {
                return Flow::Respond(UploadError::TooLarge { limit: self.limit }.into_response());
            }

            let body = std::mem::take(request.body_mut());
            let form = match encoding {
                Encoding::UrlEncoded => self.read_urlencoded(body).await,
                Encoding::Multipart(content_type) => self.read_multipart(body, &content_type).await,
            };

            match form {
                Ok(form) => {
                    trace!(
                        "Parsed {} form fields, file: {}",
                        form.fields.len(),
                        form.file.is_some()
                    );
                    request.extensions_mut().insert(form);
                    Flow::Continue(request)
                }
                Err(err) => Flow::Respond(err.into_response()),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use axum::http::StatusCode;

    fn stage(limit: usize) -> (BodyStage, Uploads) {
        let uploads = Uploads::new(testing::upload_dir());
        (BodyStage::new(uploads.clone(), limit), uploads)
    }

    fn post(content_type: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/host/add-home")
            .header(header::CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    async fn form(stage: &BodyStage, request: Request<Body>) -> FormBody {
        match stage.run(request).await {
            Flow::Continue(mut request) => request.extensions_mut().remove::<FormBody>().unwrap(),
            Flow::Respond(response) => panic!("body stage answered {}", response.status()),
        }
    }

    fn status(flow: Flow) -> StatusCode {
        match flow {
            Flow::Continue(_) => panic!("body stage let the request through"),
            Flow::Respond(response) => response.status(),
        }
    }

    #[tokio::test]
    async fn parses_urlencoded_fields() {
        let (stage, _) = stage(1024);
        let form = form(
            &stage,
            post(
                "application/x-www-form-urlencoded",
                "email=a%40b.com&password=hunter2+2",
            ),
        )
        .await;
        assert_eq!(form.get("email"), Some("a@b.com"));
        assert_eq!(form.get("password"), Some("hunter2 2"));
        assert!(form.file.is_none());
    }

    #[tokio::test]
    async fn other_bodies_pass_untouched() {
        let (stage, _) = stage(1024);
        let request = post("application/json", "{}");
        match stage.run(request).await {
            Flow::Continue(request) => assert!(request.extensions().get::<FormBody>().is_none()),
            Flow::Respond(_) => panic!("json body was answered"),
        }
    }

    #[tokio::test]
    async fn stores_accepted_images() {
        let (stage, uploads) = stage(1024 * 1024);
        let (content_type, body) = testing::multipart(
            &[("name", "Cottage")],
            Some(("house.png", "image/png", &b"\x89PNG fake"[..])),
        );
        let form = form(&stage, post(&content_type, body)).await;

        assert_eq!(form.get("name"), Some("Cottage"));
        let file = form.file.unwrap();
        assert!(file.generated_name.ends_with("-house.png"));
        assert_eq!(file.generated_name.len(), upload::NAME_LENGTH + "-house.png".len());
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.storage_path, uploads.dir().join(&file.generated_name));
        assert_eq!(std::fs::read(&file.storage_path).unwrap(), b"\x89PNG fake");
    }

    #[tokio::test]
    async fn drops_other_types_silently() {
        let (stage, uploads) = stage(1024 * 1024);
        let (content_type, body) = testing::multipart(
            &[("name", "Cottage")],
            Some(("notes.txt", "text/plain", &b"hello"[..])),
        );
        let form = form(&stage, post(&content_type, body)).await;

        assert_eq!(form.get("name"), Some("Cottage"));
        assert!(form.file.is_none());
        assert_eq!(std::fs::read_dir(uploads.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn rejects_files_under_other_fields() {
        let (stage, uploads) = stage(1024 * 1024);
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"a.png\"\r\n\
             Content-Type: image/png\r\n\r\npng\r\n--{b}--\r\n",
            b = testing::BOUNDARY
        );
        let content_type = format!("multipart/form-data; boundary={}", testing::BOUNDARY);

        assert_eq!(
            status(stage.run(post(&content_type, body)).await),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(std::fs::read_dir(uploads.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected_without_writing() {
        let (stage, uploads) = stage(64);
        let (content_type, body) = testing::multipart(
            &[],
            Some(("big.png", "image/png", &[0u8; 512][..])),
        );

        assert_eq!(
            status(stage.run(post(&content_type, body)).await),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(std::fs::read_dir(uploads.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn declared_length_is_checked_up_front() {
        let (stage, _) = stage(4);
        let mut request = post("application/x-www-form-urlencoded", "a=12345");
        request
            .headers_mut()
            .insert(header::CONTENT_LENGTH, "7".parse().unwrap());

        assert_eq!(status(stage.run(request).await), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn form_helpers() {
        let form = FormBody {
            fields: vec![
                ("price".to_string(), " 120.5 ".to_string()),
                ("name".to_string(), "  ".to_string()),
                ("terms".to_string(), "on".to_string()),
            ],
            file: None,
        };
        assert_eq!(form.parse::<f64>("price").unwrap(), 120.5);
        assert!(matches!(form.require("name"), Err(AppError::MissingField("name"))));
        assert!(matches!(form.parse::<f64>("terms"), Err(AppError::InvalidField("terms"))));
        assert!(form.checked("terms"));
        assert!(!form.checked("other"));
    }
}
