use ndarray::{ArrayD, IxDyn};
use tile_stitching::synthetic::{add_gaussian_noise, Scene};
use tile_stitching::*;

fn scene() -> Scene {
    Scene::random(&[220, 180], 400, 11).unwrap()
}

fn float_tile(scene: &Scene, origin: &[f64], size: &[usize]) -> ImageData {
    ImageData::from(ImageStack::from_plane(scene.render(origin, size)).unwrap())
}

#[test]
fn test_recovers_integer_shift() {
    let scene = scene();
    let first = float_tile(&scene, &[0.0, 0.0], &[128, 100]);
    let second = float_tile(&scene, &[37.0, -12.0], &[128, 100]);

    let result = stitch_pairwise(&first, &second, None, None, 1, 1, &StitchingParameters::default()).unwrap();

    assert_eq!(result.shift, vec![37.0, -12.0]);
    assert!(result.cross_correlation > 0.95, "R = {}", result.cross_correlation);
}

#[test]
fn test_recovers_subpixel_shift() {
    let scene = scene();
    let first = float_tile(&scene, &[0.0, 0.0], &[128, 100]);
    let second = float_tile(&scene, &[20.4, 10.7], &[128, 100]);
    let params = StitchingParameters {
        subpixel_accuracy: true,
        ..Default::default()
    };

    let result = stitch_pairwise(&first, &second, None, None, 1, 1, &params).unwrap();

    assert!((result.shift[0] - 20.4).abs() < 0.35, "{:?}", result.shift);
    assert!((result.shift[1] - 10.7).abs() < 0.35, "{:?}", result.shift);
}

#[test]
fn test_mixed_pixel_types() {
    let scene = scene();
    let first = ImageData::from(scene.render_tile::<u8>(&[0.0, 0.0], &[96, 96]).unwrap());
    let second = ImageData::from(scene.render_tile::<u16>(&[-15.0, 22.0], &[96, 96]).unwrap());

    let result = stitch_pairwise(&first, &second, None, None, 1, 1, &StitchingParameters::default()).unwrap();

    assert_eq!(result.shift, vec![-15.0, 22.0]);
}

#[test]
fn test_noise_does_not_move_the_peak() {
    let scene = scene();
    let mut first = scene.render(&[0.0, 0.0], &[120, 120]);
    let mut second = scene.render(&[30.0, 8.0], &[120, 120]);
    add_gaussian_noise(&mut first, 3.0, 1).unwrap();
    add_gaussian_noise(&mut second, 3.0, 2).unwrap();

    let result = compute_phase_correlation(&first.view(), &second.view(), 5, false).unwrap();

    assert_eq!(result.shift, vec![30.0, 8.0]);
    assert!(result.cross_correlation > 0.8);
}

#[test]
fn test_roi_shift_is_reported_in_tile_coordinates() {
    let scene = scene();
    let first = float_tile(&scene, &[0.0, 0.0], &[120, 100]);
    let second = float_tile(&scene, &[90.0, 5.0], &[120, 100]);
    let roi1 = RegionOfInterest::Rectangle(Rect::new(70, 0, 50, 100));
    let roi2 = RegionOfInterest::Rectangle(Rect::new(0, 0, 50, 100));

    let result = stitch_pairwise(
        &first,
        &second,
        Some(&roi1),
        Some(&roi2),
        1,
        1,
        &StitchingParameters::default(),
    )
    .unwrap();

    assert_eq!(result.shift, vec![90.0, 5.0]);
}

#[test]
fn test_polygon_roi_is_ignored() {
    let scene = scene();
    let first = float_tile(&scene, &[0.0, 0.0], &[100, 100]);
    let second = float_tile(&scene, &[12.0, 9.0], &[100, 100]);
    let polygon = RegionOfInterest::Polygon(vec![(0.0, 0.0), (50.0, 0.0), (25.0, 40.0)]);
    let params = StitchingParameters::default();

    let with_polygon = stitch_pairwise(&first, &second, Some(&polygon), None, 1, 1, &params).unwrap();
    let without = stitch_pairwise(&first, &second, None, None, 1, 1, &params).unwrap();

    assert_eq!(with_polygon, without);
}

#[test]
fn test_channel_average_and_single_channel() {
    let scene = scene();
    let size = [100, 90];
    let a = scene.render(&[0.0, 0.0], &size);
    let b = scene.render(&[18.0, -7.0], &size);
    // Channel 2 carries only a constant, so averaging keeps the structure of channel 1.
    let flat = ArrayD::from_elem(IxDyn(&size), 40.0f32);
    let first = ImageData::from(ImageStack::from_planes(2, 1, vec![a, flat.clone()]).unwrap());
    let second = ImageData::from(ImageStack::from_planes(2, 1, vec![b, flat]).unwrap());

    let averaged = stitch_pairwise(&first, &second, None, None, 1, 1, &StitchingParameters::default()).unwrap();
    assert_eq!(averaged.shift, vec![18.0, -7.0]);

    let params = StitchingParameters {
        channel1: 1,
        channel2: 1,
        ..Default::default()
    };
    let single = stitch_pairwise(&first, &second, None, None, 1, 1, &params).unwrap();
    assert_eq!(single.shift, vec![18.0, -7.0]);
}

#[test]
fn test_volume_registration() {
    let scene = Scene::random(&[64, 64, 32], 300, 5).unwrap();
    let first = float_tile(&scene, &[0.0, 0.0, 0.0], &[40, 36, 20]);
    let second = float_tile(&scene, &[6.0, -4.0, 3.0], &[40, 36, 20]);
    let params = StitchingParameters {
        dimensionality: 3,
        ..Default::default()
    };

    let result = stitch_pairwise(&first, &second, None, None, 1, 1, &params).unwrap();

    assert_eq!(result.shift, vec![6.0, -4.0, 3.0]);
}

#[test]
fn test_dimensionality_mismatch_is_rejected() {
    let flat = ImageData::blank(PixelType::U8, vec![32, 32], 1, 1).unwrap();
    let volume = ImageData::blank(PixelType::U8, vec![32, 32, 8], 1, 1).unwrap();

    let err = stitch_pairwise(&flat, &volume, None, None, 1, 1, &StitchingParameters::default()).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<StitchError>(),
        Some(StitchError::DimensionalityMismatch { first: 2, second: 3 })
    ));
}

#[test]
fn test_missing_timepoint_is_a_block_error() {
    let scene = scene();
    let first = float_tile(&scene, &[0.0, 0.0], &[64, 64]);
    let second = float_tile(&scene, &[4.0, 4.0], &[64, 64]);

    let err = stitch_pairwise(&first, &second, None, None, 1, 2, &StitchingParameters::default()).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<StitchError>(),
        Some(StitchError::BlockUnavailable { timepoint: 2, .. })
    ));
}
