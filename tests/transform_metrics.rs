//! The metrics recorder is process-global, so this file holds a single test.
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};
use imgshift::{
    ImageFormat, Pipeline, TransformError, TransformMetrics, TransformRequest, UploadedImage,
    compress_batch, set_transform_metrics,
};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 200, 30])))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}

#[derive(Default)]
struct Recorder {
    outcomes: Mutex<Vec<bool>>,
}

impl TransformMetrics for Recorder {
    fn record_transform(&self, _latency: Duration, result: Result<(), &TransformError>) {
        self.outcomes.lock().unwrap().push(result.is_ok());
    }
}

#[test]
fn metrics_observer_sees_each_run_until_the_failure() {
    let recorder = Arc::new(Recorder::default());
    set_transform_metrics(Some(recorder.clone()));

    let uploads = vec![
        UploadedImage::new(png(4, 4)),
        UploadedImage::new(vec![0u8; 16]),
        UploadedImage::new(png(4, 4)),
    ];
    let _ = compress_batch(
        &Pipeline::default(),
        &TransformRequest::new(ImageFormat::Png),
        &uploads,
    );
    set_transform_metrics(None);

    assert_eq!(*recorder.outcomes.lock().unwrap(), vec![true, false]);
}
