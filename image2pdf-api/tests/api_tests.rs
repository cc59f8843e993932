//! Unit and integration tests for image2pdf-api

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use http_body_util::BodyExt;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use image2pdf::PdfReader;
use image2pdf_api::{
    app, ConvertResponse, ErrorResponse, ResponseMode, ServerConfig, INTERNAL_ERROR_DETAIL,
};
use std::io::Cursor;
use tempfile::TempDir;
use tower::util::ServiceExt;

const BOUNDARY: &str = "----WebKitFormBoundary7MA4YWxkTrZu0gW";

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 100, 50]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn grey_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = GrayImage::from_pixel(width, height, Luma([128]));
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}

/// Build a multipart body from `(field name, filename, bytes)` parts.
fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn convert_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .body(Body::empty())
        .unwrap()
}

/// Configuration pointing at scratch directories that live as long as the guard.
fn test_config(mode: ResponseMode) -> (TempDir, ServerConfig) {
    let dir = TempDir::new().unwrap();
    let static_dir = dir.path().join("static");
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(static_dir.join("index.html"), "<h1>Images to PDF</h1>").unwrap();
    std::fs::write(static_dir.join("script.js"), "// upload form").unwrap();

    let config = ServerConfig {
        static_dir,
        output_dir: dir.path().join("outputs"),
        response_mode: mode,
        ..ServerConfig::default()
    };
    (dir, config)
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn error_detail(response: Response) -> String {
    let body = body_bytes(response).await;
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    error.detail
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use axum::response::IntoResponse;
    use image2pdf::{ConvertError, PdfError};
    use image2pdf_api::AppError;

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            detail: "No files uploaded.".to_string(),
        };
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["detail"], "No files uploaded.");
    }

    #[test]
    fn test_client_errors_map_to_bad_request() {
        let app_error: AppError = ConvertError::InvalidFormat {
            filename: "x.gif".into(),
        }
        .into();
        assert_eq!(app_error.into_response().status(), StatusCode::BAD_REQUEST);

        let app_error = AppError::Multipart("truncated".into());
        assert_eq!(app_error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_errors_map_to_server_error() {
        let app_error: AppError = ConvertError::AssembleFailure {
            index: 0,
            source: PdfError::InvalidStructure("broken".into()),
        }
        .into();
        assert_eq!(
            app_error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let app_error: AppError = io_error.into();
        assert_eq!(app_error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged_while(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_rejected_uploads_are_logged() {
        let logs = logged_while(|| {
            let response = AppError::Multipart("truncated part".into()).into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        });
        assert!(logs.contains("WARN"));
        assert!(logs.contains("truncated part"));

        let logs = logged_while(|| {
            let response = AppError::PayloadTooLarge("length limit exceeded".into()).into_response();
            assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        });
        assert!(logs.contains("length limit exceeded"));
    }

    #[tokio::test]
    async fn test_internal_detail_is_not_leaked() {
        let response = AppError::Internal("secret path /var/lib/x".into()).into_response();
        assert_eq!(error_detail(response).await, INTERNAL_ERROR_DETAIL);
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_health_check_endpoint() {
        let (_dir, config) = test_config(ResponseMode::Binary);
        let response = app(config).oneshot(get_request("/api/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "image2pdf API");
        assert!(json["version"].is_string());
    }

    #[tokio::test]
    async fn test_convert_returns_pdf_attachment() {
        let (dir, config) = test_config(ResponseMode::Binary);
        let (a, b) = (png(100, 50), grey_jpeg(200, 200));
        let body = multipart_body(&[("files", "a.png", &a), ("files", "b.jpg", &b)]);

        let response = app(config)
            .oneshot(convert_request("/convert/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"output.pdf\""
        );
        assert!(response.headers().contains_key("x-request-id"));

        let pdf = body_bytes(response).await;
        assert!(pdf.starts_with(b"%PDF-"));
        let reader = PdfReader::new(&pdf).unwrap();
        let pages = reader.pages().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!((pages[0].width(), pages[0].height()), (100.0, 50.0));
        assert_eq!((pages[1].width(), pages[1].height()), (200.0, 200.0));

        // Binary mode leaves nothing behind
        let leftovers = std::fs::read_dir(dir.path().join("outputs")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_convert_without_trailing_slash_and_files_array_name() {
        let (_dir, config) = test_config(ResponseMode::Binary);
        let image = png(3, 3);
        let body = multipart_body(&[("files[]", "one.PNG", &image)]);

        let response = app(config)
            .oneshot(convert_request("/convert", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_no_files_uploaded() {
        let (_dir, config) = test_config(ResponseMode::Binary);
        let response = app(config)
            .oneshot(convert_request("/convert/", multipart_body(&[])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_detail(response).await, "No files uploaded.");
    }

    #[tokio::test]
    async fn test_empty_file_part_and_other_fields_are_ignored() {
        let (_dir, config) = test_config(ResponseMode::Binary);
        let body = multipart_body(&[("files", "", b"".as_slice()), ("note", "note.png", b"ignored".as_slice())]);

        let response = app(config)
            .oneshot(convert_request("/convert/", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_detail(response).await, "No files uploaded.");
    }

    #[tokio::test]
    async fn test_invalid_extension_is_rejected() {
        let (_dir, config) = test_config(ResponseMode::Binary);
        let image = png(4, 4);
        let body = multipart_body(&[("files", "a.png", &image), ("files", "notes.gif", &image)]);

        let response = app(config)
            .oneshot(convert_request("/convert/", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_detail(response).await,
            "File 'notes.gif' is not a valid image format."
        );
    }

    #[tokio::test]
    async fn test_undecodable_image_fails_whole_request() {
        let (dir, config) = test_config(ResponseMode::Link);
        let image = png(4, 4);
        let body = multipart_body(&[
            ("files", "good.png", &image),
            ("files", "bad.png", b"not really a png".as_slice()),
        ]);

        let response = app(config)
            .oneshot(convert_request("/convert/", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_detail(response).await,
            "Failed to open image bad.png. Please check the file format."
        );

        // Nothing was persisted
        let outputs = dir.path().join("outputs");
        let persisted = std::fs::read_dir(&outputs).map(|d| d.count()).unwrap_or(0);
        assert_eq!(persisted, 0);
    }

    #[tokio::test]
    async fn test_link_mode_returns_download_url() {
        let (_dir, config) = test_config(ResponseMode::Link);
        let router = app(config);
        let image = png(10, 20);

        let mut urls = Vec::new();
        for _ in 0..2 {
            let body = multipart_body(&[("files", "page.png", &image)]);
            let response = router
                .clone()
                .oneshot(convert_request("/convert/", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let json: ConvertResponse =
                serde_json::from_slice(&body_bytes(response).await).unwrap();
            assert!(json.download_url.starts_with("/outputs/"));
            assert!(json.download_url.ends_with("/output.pdf"));
            urls.push(json.download_url);
        }
        assert_ne!(urls[0], urls[1]);

        let response = router.oneshot(get_request(&urls[0])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let pdf = body_bytes(response).await;
        let reader = PdfReader::new(&pdf).unwrap();
        assert_eq!(reader.page_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_outputs_not_served_in_binary_mode() {
        let (_dir, config) = test_config(ResponseMode::Binary);
        let response = app(config)
            .oneshot(get_request("/outputs/anything/output.pdf"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_rejected() {
        let (_dir, mut config) = test_config(ResponseMode::Binary);
        config.max_upload_bytes = 1024;
        let big = vec![0u8; 8 * 1024];
        let body = multipart_body(&[("files", "big.png", &big)]);

        let response = app(config)
            .oneshot(convert_request("/convert/", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal_error() {
        let (dir, mut config) = test_config(ResponseMode::Binary);
        // A regular file where the output directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        config.output_dir = blocker.join("outputs");

        let image = png(2, 2);
        let body = multipart_body(&[("files", "a.png", &image)]);
        let response = app(config)
            .oneshot(convert_request("/convert/", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_detail(response).await, INTERNAL_ERROR_DETAIL);
    }

    #[tokio::test]
    async fn test_landing_page_and_static_assets() {
        let (_dir, config) = test_config(ResponseMode::Binary);
        let router = app(config);

        let response = router.clone().oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"<h1>Images to PDF</h1>");

        let response = router.oneshot(get_request("/static/script.js")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"// upload form");
    }
}
