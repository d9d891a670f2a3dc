use std::f32::consts::FRAC_PI_2;

use approx::assert_abs_diff_eq;

use super::*;
use Color as C;

fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Image {
    Image::from_fn(W as u32, H as u32, |x, y| data[y as usize][x as usize])
}

#[test]
fn sample_nearest() {
    let image = mkimage([[C::RED, C::GREEN], [C::BLUE, C::WHITE]]);

    assert_eq!(image.sample(0.0, 0.0), C::RED);
    assert_eq!(image.sample(0.99, 0.5), C::RED);
    assert_eq!(image.sample(1.0, 0.0), C::GREEN);
    assert_eq!(image.sample(0.5, 1.5), C::BLUE);
    assert_eq!(image.sample(1.5, 1.5), C::WHITE);

    assert_eq!(image.sample(-0.1, 0.0), C::NULL);
    assert_eq!(image.sample(2.0, 0.0), C::NULL);
    assert_eq!(image.sample(0.0, 2.0), C::NULL);
    assert_eq!(image.sample(f32::NAN, 0.0), C::NULL);
}

#[test]
fn png_round_trip() {
    let image = mkimage([[C::RED, C::GREEN, C::BLUE], [C::WHITE, C::BLACK, C::RED]]);
    let data = image.encode(ImageFormat::Png).unwrap();
    let decoded = Image::decode(&data, ImageFormat::Png).unwrap();

    assert_eq!(decoded.resolution(), Resolution::new(3, 2));
    for y in 0..2 {
        for x in 0..3 {
            assert_eq!(decoded.get(x, y), image.get(x, y));
        }
    }
}

#[test]
fn jpeg_encodes_opaque() {
    let image = Image::new(16, 8);
    let data = image.encode(ImageFormat::Jpeg).unwrap();
    let decoded = Image::decode(&data, ImageFormat::Jpeg).unwrap();

    assert_eq!(decoded.resolution(), Resolution::new(16, 8));
    assert_eq!(decoded.get(3, 3).a(), 255);
}

#[test]
fn decode_rejects_garbage() {
    assert!(Image::decode(b"definitely not a png", ImageFormat::Png).is_err());
    assert!(Image::decode(&[], ImageFormat::Jpeg).is_err());

    // Valid PNG data, but declared as JPEG.
    let png = Image::new(4, 4).encode(ImageFormat::Png).unwrap();
    assert!(Image::decode(&png, ImageFormat::Jpeg).is_err());

    // Truncated data.
    let jpeg = Image::new(32, 32).encode(ImageFormat::Jpeg).unwrap();
    assert!(Image::decode(&jpeg[..jpeg.len() / 3], ImageFormat::Jpeg).is_err());
}

#[test]
fn decode_any_detects_format() {
    let mut image = Image::new(4, 4);
    image.set(1, 2, C::RED);
    let png = image.encode(ImageFormat::Png).unwrap();
    let decoded = Image::decode_any(&png).unwrap();
    assert_eq!(decoded.resolution(), image.resolution());
    assert_eq!(decoded.get(1, 2), C::RED);

    let jpeg = Image::new(16, 8).encode(ImageFormat::Jpeg).unwrap();
    assert_eq!(Image::decode_any(&jpeg).unwrap().width(), 16);

    assert!(Image::decode_any(b"definitely not a png").is_err());
    assert!(Image::decode_any(&[]).is_err());
    assert!(Image::decode_any(&png[..png.len() / 2]).is_err());
}

#[test]
fn format_from_path() {
    assert_eq!(
        ImageFormat::from_path("a/b.jpg".as_ref()).unwrap(),
        ImageFormat::Jpeg
    );
    assert_eq!(
        ImageFormat::from_path("b.png".as_ref()).unwrap(),
        ImageFormat::Png
    );
    assert!(ImageFormat::from_path("b.gif".as_ref()).is_err());
    assert!(ImageFormat::from_path("noext".as_ref()).is_err());
}

#[test]
fn letterbox_rect() {
    let rect = RotatedRect::letterbox(Resolution::new(200, 100));
    assert_eq!(rect.center(), [100.0, 50.0]);
    assert_eq!(rect.width(), 200.0);
    assert_eq!(rect.height(), 200.0);

    assert_eq!(rect.transform_out(0.0, 0.0), [0.0, -50.0]);
    assert_eq!(rect.transform_out(1.0, 1.0), [200.0, 150.0]);
    assert_eq!(rect.transform_out(0.5, 0.5), [100.0, 50.0]);
}

#[test]
fn rotated_transform() {
    let rect = RotatedRect::new(10.0, 10.0, 4.0, 2.0, FRAC_PI_2);

    // A quarter turn clockwise maps the local +X axis to the image's +Y axis.
    let [x, y] = rect.transform_out(1.0, 0.5);
    assert_abs_diff_eq!(x, 10.0, epsilon = 1e-5);
    assert_abs_diff_eq!(y, 12.0, epsilon = 1e-5);

    let [x, y] = rect.transform_out(0.5, 0.0);
    assert_abs_diff_eq!(x, 11.0, epsilon = 1e-5);
    assert_abs_diff_eq!(y, 10.0, epsilon = 1e-5);

    let shifted = rect.shift_local(0.0, -1.0);
    let [x, y] = shifted.center();
    assert_abs_diff_eq!(x, 11.0, epsilon = 1e-5);
    assert_abs_diff_eq!(y, 10.0, epsilon = 1e-5);

    let square = rect.square_scaled(2.0);
    assert_eq!(square.width(), 8.0);
    assert_eq!(square.height(), 8.0);
    // Still rotated by a quarter turn.
    let [x, y] = square.transform_out(1.0, 0.5);
    assert_abs_diff_eq!(x, 10.0, epsilon = 1e-5);
    assert_abs_diff_eq!(y, 14.0, epsilon = 1e-5);
}

#[test]
fn draw_clips_to_image() {
    let mut image = Image::new(4, 4);
    draw::fill_rect(&mut image, -2, -2, 4, 4).color(C::RED);

    assert_eq!(image.get(0, 0), C::RED);
    assert_eq!(image.get(1, 1), C::RED);
    assert_eq!(image.get(2, 2), C::NULL);

    let mut image = Image::new(20, 20);
    image.clear(C::WHITE);
    draw::text(&mut image, 10, 10, "x").color(C::BLACK);
    let drawn = (0..20)
        .flat_map(|y| (0..20).map(move |x| (x, y)))
        .filter(|&(x, y)| image.get(x, y) == C::BLACK)
        .count();
    assert!(drawn > 0);
}
