use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::CaptureError;
use crate::utils::http::build_http_client;
use crate::utils::timing::log_provider_timing;

const PROVIDER_NAME: &str = "stability";

// Generation policy for the booth. These are deliberate constants, not
// configuration: every visitor gets the same look.
const GENERATION_MODE: &str = "image-to-image";
const CONDITIONING_STRENGTH: &str = "0.5";
const SAMPLER: &str = "k_lms";
const MODEL: &str = "sd3.5-large-turbo";
const STEPS: &str = "30";
const CFG_SCALE: &str = "4";
const STYLE_PRESET: &str = "photographic";
const NEGATIVE_PROMPT: &str =
    "blurry, deformed, low resolution, disfigured, cartoon, abstract, bad quality";

/// Known response layouts for the image payload. The provider has shipped
/// all three across versions and models, so the body is probed against them
/// in order; extend this list when the schema drifts again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadShape {
    /// `{"artifacts": [{"base64": "..."}]}`
    ArtifactList,
    /// `{"images": [{"data": "..."}]}` or `{"images": [{"base64": "..."}]}`
    ImageList,
    /// `{"image": "..."}`
    TopLevel,
}

const SHAPE_PROBE_ORDER: [PayloadShape; 3] = [
    PayloadShape::ArtifactList,
    PayloadShape::ImageList,
    PayloadShape::TopLevel,
];

impl PayloadShape {
    fn container_key(self) -> &'static str {
        match self {
            PayloadShape::ArtifactList => "artifacts",
            PayloadShape::ImageList => "images",
            PayloadShape::TopLevel => "image",
        }
    }

    fn extract(self, body: &Value) -> Option<&str> {
        match self {
            PayloadShape::ArtifactList => body
                .get("artifacts")?
                .get(0)?
                .get("base64")?
                .as_str(),
            PayloadShape::ImageList => {
                let first = body.get("images")?.get(0)?;
                first
                    .get("data")
                    .or_else(|| first.get("base64"))?
                    .as_str()
            }
            PayloadShape::TopLevel => body.get("image")?.as_str(),
        }
    }
}

/// First shape whose container key is present wins; a present-but-empty
/// payload is reported as such rather than falling through to later shapes.
fn extract_image_base64(body: &Value) -> Result<(&'static str, &str), CaptureError> {
    for shape in SHAPE_PROBE_ORDER {
        let key = shape.container_key();
        if body.get(key).is_none() {
            continue;
        }
        let encoded = shape.extract(body).unwrap_or_default();
        if encoded.is_empty() {
            return Err(CaptureError::EmptyPayload {
                key,
                body: body.to_string(),
            });
        }
        return Ok((key, encoded));
    }

    Err(CaptureError::ResponseShape {
        body: body.to_string(),
    })
}

fn decode_image_payload(body: &Value) -> Result<Vec<u8>, CaptureError> {
    let (key, encoded) = extract_image_base64(body)?;
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|source| CaptureError::Decode { key, source })
}

fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn build_scene_prompt(profession: &str, age: i64) -> String {
    format!(
        "Dramatic past-life scene of a {profession}, age {age}, high quality, \
         job side background, working the job, 8k, cinematic, clear image, photorealistic"
    )
}

pub struct StabilityClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl StabilityClient {
    pub fn new(config: &Config) -> Self {
        StabilityClient {
            client: build_http_client(config.stability_timeout_secs),
            api_key: config.stability_api_key.clone(),
            endpoint: config.stability_endpoint.clone(),
        }
    }

    fn build_form(&self, image_bytes: Vec<u8>, profession: &str, age: i64) -> Result<Form, CaptureError> {
        let mime_type = detect_mime_type(&image_bytes).unwrap_or_else(|| {
            warn!("could not sniff input image type, sending as image/png");
            "image/png".to_string()
        });
        let image_part = Part::bytes(image_bytes)
            .file_name("source-photo")
            .mime_str(&mime_type)
            .map_err(|err| CaptureError::provider(PROVIDER_NAME, err.to_string()))?;

        Ok(Form::new()
            .part("image", image_part)
            .text("prompt", build_scene_prompt(profession, age))
            .text("negative_prompt", NEGATIVE_PROMPT)
            .text("mode", GENERATION_MODE)
            .text("strength", CONDITIONING_STRENGTH)
            .text("sampler", SAMPLER)
            .text("model", MODEL)
            .text("steps", STEPS)
            .text("cfg_scale", CFG_SCALE)
            .text("style_preset", STYLE_PRESET))
    }

    /// Submits the source photo for an image-to-image pass and returns the
    /// decoded bytes of the transformed image. The input file is sent as-is,
    /// never decoded or validated as an image on this side.
    pub async fn transform(
        &self,
        image_path: &Path,
        profession: &str,
        age: i64,
    ) -> Result<Vec<u8>, CaptureError> {
        let image_bytes = tokio::fs::read(image_path)
            .await
            .map_err(|source| CaptureError::Input {
                path: image_path.to_path_buf(),
                source,
            })?;

        debug!(
            target: "providers.stability",
            image_bytes = image_bytes.len(),
            profession,
            age,
            "requesting image transform"
        );

        log_provider_timing(PROVIDER_NAME, MODEL, "transform_image", || async {
            let form = self.build_form(image_bytes, profession, age)?;
            let response = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Accept", "application/json")
                .multipart(form)
                .send()
                .await
                .map_err(|err| CaptureError::provider(PROVIDER_NAME, err.to_string()))?;

            let status = response.status();
            let body_text = response
                .text()
                .await
                .map_err(|err| CaptureError::provider(PROVIDER_NAME, err.to_string()))?;

            if !status.is_success() {
                return Err(CaptureError::provider(
                    PROVIDER_NAME,
                    format!("status {status}: {body_text}"),
                ));
            }

            // The schema is known to drift; keep the whole body inspectable.
            debug!(target: "providers.stability", raw_response = %body_text);

            let body: Value = serde_json::from_str(&body_text).map_err(|err| {
                CaptureError::provider(PROVIDER_NAME, format!("non-JSON response: {err}"))
            })?;

            decode_image_payload(&body)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const IMAGE_BYTES: &[u8] = b"not actually a png, just payload bytes";

    fn encoded() -> String {
        general_purpose::STANDARD.encode(IMAGE_BYTES)
    }

    #[test]
    fn all_three_shapes_decode_to_identical_bytes() {
        let bodies = [
            json!({ "artifacts": [{ "base64": encoded() }] }),
            json!({ "images": [{ "data": encoded() }] }),
            json!({ "images": [{ "base64": encoded() }] }),
            json!({ "image": encoded() }),
        ];
        for body in bodies {
            let decoded = decode_image_payload(&body).expect("shape should decode");
            assert_eq!(decoded, IMAGE_BYTES);
        }
    }

    #[test]
    fn artifact_list_wins_over_later_shapes() {
        let body = json!({
            "artifacts": [{ "base64": encoded() }],
            "image": general_purpose::STANDARD.encode(b"other bytes"),
        });
        let (key, _) = extract_image_base64(&body).unwrap();
        assert_eq!(key, "artifacts");
    }

    #[test]
    fn unknown_shape_reports_full_body() {
        let body = json!({ "foo": "bar" });
        match decode_image_payload(&body) {
            Err(CaptureError::ResponseShape { body }) => {
                assert!(body.contains("\"foo\""));
            }
            other => panic!("expected ResponseShape, got {other:?}"),
        }
    }

    #[test]
    fn present_but_empty_key_is_an_empty_payload() {
        let cases = [
            json!({ "artifacts": [{}] }),
            json!({ "artifacts": [] }),
            json!({ "images": [{ "data": "" }] }),
            json!({ "image": "" }),
        ];
        for body in cases {
            match decode_image_payload(&body) {
                Err(CaptureError::EmptyPayload { .. }) => {}
                other => panic!("expected EmptyPayload for {body}, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_container_does_not_fall_through_to_later_shapes() {
        let body = json!({
            "artifacts": [],
            "image": encoded(),
        });
        match decode_image_payload(&body) {
            Err(CaptureError::EmptyPayload { key, .. }) => assert_eq!(key, "artifacts"),
            other => panic!("expected EmptyPayload, got {other:?}"),
        }
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let body = json!({ "image": "@@not-base64@@" });
        match decode_image_payload(&body) {
            Err(CaptureError::Decode { key, .. }) => assert_eq!(key, "image"),
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn scene_prompt_names_profession_and_age() {
        let prompt = build_scene_prompt("blacksmith", 47);
        assert!(prompt.contains("past-life scene of a blacksmith"));
        assert!(prompt.contains("age 47"));
        assert!(prompt.contains("photorealistic"));
    }
}
