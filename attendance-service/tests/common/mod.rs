#![allow(dead_code)]

use attendance_service::config::AttendanceConfig;
use attendance_service::services::providers::VisionProvider;
use attendance_service::startup::Application;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::multipart;
use service_core::config::Config as CoreConfig;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn with default settings around `provider` (`None` = no API key).
    pub async fn spawn(provider: Option<Arc<dyn VisionProvider>>) -> Self {
        Self::spawn_with(test_config(&[]), provider).await
    }

    pub async fn spawn_with(
        config: AttendanceConfig,
        provider: Option<Arc<dyn VisionProvider>>,
    ) -> Self {
        let app = Application::build_with_provider(config, provider)
            .await
            .expect("Failed to build test application");
        Self::run(app).await
    }

    /// Spawn through the real bootstrap path (Gemini provider from config).
    pub async fn spawn_from_config(config: AttendanceConfig) -> Self {
        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        Self::run(app).await
    }

    async fn run(app: Application) -> Self {
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            client,
        }
    }

    pub async fn post_analyze(&self, form: multipart::Form) -> reqwest::Response {
        self.client
            .post(format!("{}/api/analyze", self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

/// Config bound to a random localhost port, built from `vars` only.
pub fn test_config(vars: &[(&str, &str)]) -> AttendanceConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let common = CoreConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    };

    AttendanceConfig::from_lookup(common, |key| vars.get(key).cloned())
        .expect("Failed to build test configuration")
}

pub fn encoded_image(format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(8, 6, |x, y| {
        Rgb([(x * 30) as u8, (y * 40) as u8, 200])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .expect("Failed to encode test image");
    buf
}

pub fn png_bytes() -> Vec<u8> {
    encoded_image(ImageFormat::Png)
}

pub fn image_form(bytes: Vec<u8>, file_name: &str) -> multipart::Form {
    multipart::Form::new().part(
        "image",
        multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("image/png")
            .expect("valid mime"),
    )
}
