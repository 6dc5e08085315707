use std::io::Cursor;

use image::{DynamicImage, Rgb, RgbImage};
use imgshift::{
    ImageFormat, ImageStore, InMemoryImageStore, NewImage, Pipeline, ServiceError,
    TransformRequest, UploadedImage, compress_batch, find_owned_image, transform_stored_image,
};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 200, 30])))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}

async fn store_with_image(owner: &str) -> (InMemoryImageStore, String, Vec<u8>) {
    let store = InMemoryImageStore::new();
    let bytes = png(40, 20);
    let stored = store
        .create(NewImage {
            user: owner.to_string(),
            image: bytes.clone(),
            format: "image/png".to_string(),
            size: bytes.len() as u64,
            original_name: "pic.png".to_string(),
        })
        .await
        .expect("create");
    (store, stored.id, bytes)
}

#[test]
fn corrupt_image_aborts_the_whole_batch() {
    let uploads = vec![
        UploadedImage::new(png(8, 8)),
        UploadedImage::new(b"definitely not an image".to_vec()),
        UploadedImage::new(png(8, 8)),
    ];
    let request = TransformRequest::new(ImageFormat::Webp);

    let err = compress_batch(&Pipeline::default(), &request, &uploads).unwrap_err();
    match err {
        ServiceError::Transform(err) => assert_eq!(err.to_string(), "Error transforming image"),
        other => panic!("expected transform failure, got {other:?}"),
    }
}

#[test]
fn empty_batches_and_empty_files_fail_validation() {
    let request = TransformRequest::new(ImageFormat::Png);

    let err = compress_batch(&Pipeline::default(), &request, &[]).unwrap_err();
    let ServiceError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.messages_for("image"), vec!["At least one image is required"]);

    let mut empty = UploadedImage::new(Vec::new());
    empty.file_name = Some("blank.png".into());
    let err = compress_batch(&Pipeline::default(), &request, &[empty]).unwrap_err();
    let ServiceError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.messages_for("image"), vec!["Image blank.png is empty"]);
}

#[test]
fn encoding_to_a_format_without_encoder_is_a_transform_failure() {
    for format in [ImageFormat::Jxl, ImageFormat::Jp2] {
        let request = TransformRequest::new(format);
        let err = compress_batch(
            &Pipeline::default(),
            &request,
            &[UploadedImage::new(png(4, 4))],
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Transform(_)), "{format}");
    }
}

#[tokio::test]
async fn other_users_cannot_transform_an_image() {
    let (store, id, original) = store_with_image("user-a").await;
    let request = TransformRequest::new(ImageFormat::Jpeg).with_grayscale(true);

    let err = transform_stored_image(&store, &Pipeline::default(), "user-b", &id, &request)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden));
    assert_eq!(err.to_string(), "You are not authorized to access this image");

    let unchanged = store.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(unchanged.image, original);
}

#[tokio::test]
async fn owners_transform_without_touching_the_record() {
    let (store, id, original) = store_with_image("user-a").await;
    let request = TransformRequest::new(ImageFormat::Webp).with_resize(10, 10);

    let result = transform_stored_image(&store, &Pipeline::default(), "user-a", &id, &request)
        .await
        .expect("owner transform");
    assert_eq!(result.original_metadata.width, 40);
    assert_eq!(result.new_metadata.width, 10);
    assert_eq!(result.new_metadata.format, "webp");

    let unchanged = store.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(unchanged.image, original);
    assert_eq!(unchanged.created_at, unchanged.updated_at);
}

#[tokio::test]
async fn missing_image_is_not_found() {
    let store = InMemoryImageStore::new();
    let err = find_owned_image(&store, "8f14e45f-ceea-4e5a-9c1d-000000000000", "anyone")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound));
    assert_eq!(err.to_string(), "Image not found");
}
