//! Fixed-order transform pipeline.
//!
//! The order below is part of the public contract and never changes:
//!
//! 1. decode, capturing the original metadata
//! 2. build encode options (`lossless` only attached when requested)
//! 3. resize, if requested
//! 4. grayscale, if requested
//! 5. rotate, if requested and non-zero
//! 6. encode
//! 7. wrap the output as a `data:` URI
//!
//! Rotating after resizing means a 90° turn swaps the *resized* dimensions.
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::{Codec, EncodeOptions, ImageCodec, ImageMetadata};
use crate::error::{CodecError, TransformError};
use crate::request::TransformRequest;

/// What a successful transform hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformResult {
    /// `data:<mime>;base64,<payload>`
    pub image: String,
    pub new_metadata: ImageMetadata,
    pub original_metadata: ImageMetadata,
    /// Raw encoded output, kept for callers that do not want the data URI.
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Format `bytes` as a base64 `data:` URI.
pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}

/// Runs validated requests against a [`Codec`]. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    codec: Arc<dyn Codec>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Arc::new(ImageCodec::new()))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    /// Transform `source` according to `request`.
    ///
    /// Any codec failure is collapsed into [`TransformError`]; nothing
    /// partially produced is returned.
    pub fn run(
        &self,
        request: &TransformRequest,
        source: &[u8],
    ) -> Result<TransformResult, TransformError> {
        let start = Instant::now();
        match self.execute(request, source) {
            Ok(result) => {
                debug!(
                    format = %request.format,
                    from = %result.original_metadata.format,
                    width = result.new_metadata.width,
                    height = result.new_metadata.height,
                    size = result.new_metadata.size,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "image transformed"
                );
                Ok(result)
            }
            Err(cause) => {
                warn!(
                    format = %request.format,
                    error = %cause,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "image transform failed"
                );
                Err(TransformError::from(cause))
            }
        }
    }

    fn execute(
        &self,
        request: &TransformRequest,
        source: &[u8],
    ) -> Result<TransformResult, CodecError> {
        let (mut image, original_metadata) = self.codec.decode(source)?;

        let options = EncodeOptions {
            format: request.format,
            quality: request.quality,
            lossless: request.lossless.then_some(true),
        };

        if let Some(resize) = request.resize {
            image = self.codec.resize(image, resize.width, resize.height)?;
        }

        if request.grayscale {
            image = self.codec.grayscale(image)?;
        }

        if let Some(degrees) = request.rotate.filter(|d| *d != 0.0) {
            image = self.codec.rotate(image, degrees)?;
        }

        let encoded = self.codec.encode(&image, &options)?;

        Ok(TransformResult {
            image: data_uri(request.format.mime_type(), &encoded.bytes),
            new_metadata: encoded.metadata,
            original_metadata,
            bytes: encoded.bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoded;
    use crate::format::ImageFormat;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::Mutex;

    /// Codec that records the call sequence and tracks dimensions without
    /// touching pixels.
    #[derive(Default)]
    pub struct MockCodec {
        pub operations: Mutex<Vec<RecordedOp>>,
        pub fail_on: Option<&'static str>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Decode(usize),
        Resize(u32, u32),
        Grayscale,
        Rotate(f64),
        Encode(EncodeOptions),
    }

    impl MockCodec {
        fn failing(op: &'static str) -> Self {
            Self {
                fail_on: Some(op),
                ..Default::default()
            }
        }

        fn record(&self, op: RecordedOp, name: &str) -> Result<(), CodecError> {
            self.operations.lock().unwrap().push(op);
            if self.fail_on == Some(name) {
                return Err(CodecError::InvalidOperation(format!("mock {name} failure")));
            }
            Ok(())
        }

        fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl Codec for MockCodec {
        fn decode(&self, bytes: &[u8]) -> Result<(DynamicImage, ImageMetadata), CodecError> {
            self.record(RecordedOp::Decode(bytes.len()), "decode")?;
            Ok((
                DynamicImage::new_rgb8(40, 20),
                ImageMetadata {
                    width: 40,
                    height: 20,
                    size: bytes.len(),
                    format: "png".into(),
                },
            ))
        }

        fn resize(
            &self,
            _image: DynamicImage,
            width: u32,
            height: u32,
        ) -> Result<DynamicImage, CodecError> {
            self.record(RecordedOp::Resize(width, height), "resize")?;
            Ok(DynamicImage::new_rgb8(width, height))
        }

        fn grayscale(&self, image: DynamicImage) -> Result<DynamicImage, CodecError> {
            self.record(RecordedOp::Grayscale, "grayscale")?;
            Ok(image)
        }

        fn rotate(&self, image: DynamicImage, degrees: f64) -> Result<DynamicImage, CodecError> {
            self.record(RecordedOp::Rotate(degrees), "rotate")?;
            Ok(DynamicImage::new_rgb8(image.height(), image.width()))
        }

        fn encode(
            &self,
            image: &DynamicImage,
            options: &EncodeOptions,
        ) -> Result<Encoded, CodecError> {
            self.record(RecordedOp::Encode(*options), "encode")?;
            let bytes = vec![7u8; 3];
            Ok(Encoded {
                metadata: ImageMetadata {
                    width: image.width(),
                    height: image.height(),
                    size: bytes.len(),
                    format: options.format.name().into(),
                },
                bytes,
            })
        }
    }

    fn run_mock(
        codec: MockCodec,
        request: &TransformRequest,
    ) -> (Arc<MockCodec>, Result<TransformResult, TransformError>) {
        let codec = Arc::new(codec);
        let pipeline = Pipeline::new(codec.clone());
        let result = pipeline.run(request, b"source");
        (codec, result)
    }

    #[test]
    fn steps_run_in_fixed_order() {
        let request = TransformRequest::new(ImageFormat::Webp)
            .with_rotate(90.0)
            .with_grayscale(true)
            .with_resize(10, 5);
        let (codec, result) = run_mock(MockCodec::default(), &request);
        let result = result.unwrap();

        assert_eq!(
            codec.get_operations(),
            vec![
                RecordedOp::Decode(6),
                RecordedOp::Resize(10, 5),
                RecordedOp::Grayscale,
                RecordedOp::Rotate(90.0),
                RecordedOp::Encode(EncodeOptions {
                    format: ImageFormat::Webp,
                    quality: 80,
                    lossless: None,
                }),
            ]
        );
        assert_eq!((result.new_metadata.width, result.new_metadata.height), (5, 10));
        assert_eq!(result.original_metadata.width, 40);
    }

    #[test]
    fn absent_steps_are_skipped() {
        let request = TransformRequest::new(ImageFormat::Png).with_rotate(0.0);
        let (codec, result) = run_mock(MockCodec::default(), &request);
        assert!(result.is_ok());
        let ops = codec.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], RecordedOp::Decode(_)));
        assert!(matches!(ops[1], RecordedOp::Encode(_)));
    }

    #[test]
    fn lossless_flag_only_attached_when_requested() {
        let request = TransformRequest::new(ImageFormat::Avif)
            .with_quality(55)
            .with_lossless(true);
        let (codec, _) = run_mock(MockCodec::default(), &request);
        assert_eq!(
            codec.get_operations().last(),
            Some(&RecordedOp::Encode(EncodeOptions {
                format: ImageFormat::Avif,
                quality: 55,
                lossless: Some(true),
            }))
        );
    }

    #[test]
    fn codec_failure_is_opaque_and_stops_the_chain() {
        let request = TransformRequest::new(ImageFormat::Png)
            .with_resize(3, 3)
            .with_grayscale(true);
        let (codec, result) = run_mock(MockCodec::failing("resize"), &request);
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Error transforming image");
        assert!(!codec
            .get_operations()
            .iter()
            .any(|op| matches!(op, RecordedOp::Grayscale | RecordedOp::Encode(_))));
    }

    #[test]
    fn output_is_a_data_uri() {
        let request = TransformRequest::new(ImageFormat::Jpg);
        let (_, result) = run_mock(MockCodec::default(), &request);
        let result = result.unwrap();
        assert_eq!(result.image, "data:image/jpeg;base64,BwcH");
        assert_eq!(result.bytes, vec![7, 7, 7]);
        assert_eq!(result.new_metadata.format, "jpeg");
    }

    #[test]
    fn serialized_result_omits_raw_bytes() {
        let request = TransformRequest::new(ImageFormat::Png);
        let (_, result) = run_mock(MockCodec::default(), &request);
        let json = serde_json::to_value(result.unwrap()).unwrap();
        assert!(json.get("bytes").is_none());
        assert!(json["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
        assert_eq!(json["original_metadata"]["width"], 40);
    }

    #[test]
    fn real_codec_resizes_then_rotates() {
        let source = RgbImage::from_fn(60, 30, |x, y| Rgb([x as u8, y as u8, 0]));
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(source)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let request = TransformRequest::new(ImageFormat::Png)
            .with_resize(20, 8)
            .with_rotate(270.0);
        let result = Pipeline::default().run(&request, &png).unwrap();
        assert_eq!(result.original_metadata.width, 60);
        assert_eq!((result.new_metadata.width, result.new_metadata.height), (8, 20));
    }
}
