use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, GenericImageView, ImageEncoder};
use plotwire_props::image::to_data_url;
use plotwire_props::{DType, ImageError, NdArray, TypeSpec, Value};

fn tiny_png() -> Vec<u8> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(&[255, 0, 0], 1, 1, ExtendedColorType::Rgb8)
        .expect("encode 1x1 png");
    out
}

fn temp_file(suffix: &str, contents: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(contents).expect("write temp file");
    file
}

#[test]
fn strings_pass_through_untouched() {
    for text in [
        "data:image/png;base64,AAAA",
        "https://example.com/icon.png",
        "relative/icon.png",
        "bk-tool-icon-undo",
    ] {
        assert_eq!(to_data_url(&text.into()).expect("string"), text);
    }
}

#[test]
fn image_files_become_base64_data_urls() {
    let png = tiny_png();
    let file = temp_file(".png", &png);
    let url = to_data_url(&Value::Path(file.path().to_path_buf())).expect("png file");
    assert_eq!(url, format!("data:image/png;base64,{}", STANDARD.encode(&png)));
}

#[test]
fn svg_files_are_percent_encoded() {
    let file = temp_file(".svg", b"<svg width=\"1\"/>");
    let url = to_data_url(&Value::Path(file.path().to_path_buf())).expect("svg file");
    assert_eq!(url, "data:image/svg+xml;utf8,%3Csvg%20width%3D%221%22/%3E");
}

#[test]
fn encoded_bytes_are_sniffed() {
    let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec();
    let url = to_data_url(&Value::Bytes(gif)).expect("gif bytes");
    assert!(url.starts_with("data:image/gif;base64,"), "{url}");
    assert!(matches!(
        to_data_url(&Value::Bytes(b"not an image".to_vec())),
        Err(ImageError::UnknownFormat)
    ));
}

#[test]
fn pixel_arrays_are_png_encoded() {
    for channels in [3usize, 4] {
        let array = NdArray::new(
            DType::Uint8,
            vec![2, 3, channels],
            (0..2 * 3 * channels).map(|i| (i * 10) as f64).collect(),
        )
        .expect("shape matches data");
        let url = to_data_url(&Value::Array(array)).expect("rgb array");
        let payload = url
            .strip_prefix("data:image/png;base64,")
            .expect("png data url");
        let decoded = image::load_from_memory(&STANDARD.decode(payload).expect("base64"))
            .expect("valid png");
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }
}

#[test]
fn missing_files_report_the_path() {
    let err = to_data_url(&Value::Path("/no/such/file.png".into())).expect_err("missing file");
    assert!(err.to_string().contains("/no/such/file.png"), "{err}");
}

#[test]
fn image_validation_rejects_non_images() {
    let spec = TypeSpec::Image;
    let two_channels = NdArray::new(DType::Uint8, vec![1, 1, 2], vec![0.0, 0.0]).expect("shape");
    let flat = NdArray::new(DType::Uint8, vec![2, 2], vec![0.0; 4]).expect("shape");
    for bad in [
        Value::Int(10),
        Value::Float(1.5),
        Value::Bool(true),
        Value::List(vec![]),
        Value::map(Vec::<(&str, Value)>::new()),
        Value::set([1i64]),
        Value::Array(two_channels),
        Value::Array(flat),
    ] {
        assert!(!spec.is_valid(&bad, &()), "{bad}");
    }
    assert!(spec.is_valid(&Value::Bytes(tiny_png()), &()));
    assert!(spec.is_valid(&"bk-tool-icon-undo".into(), &()));
    let message = spec
        .validate(&Value::Int(10), &(), true)
        .expect_err("ints are not images")
        .to_string();
    assert!(message.starts_with("expected an image"), "{message}");
    assert!(message.ends_with("got 10 of type int"), "{message}");
}
