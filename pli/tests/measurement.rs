use std::f64::consts::PI;
use std::time::Duration;

use assert_approx_eq::assert_approx_eq;
use marker_tracker::encoding::MarkerDictionary;
use marker_tracker::utils::set_log_config;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use pli::analysis::{Analysis, AnalysisParameter};
use pli::source::{SyntheticParameter, SyntheticPolarimeter, SyntheticSample};
use pli::tilt::{direction_error, simulate_tilt};
use pli::{
    ColorMode, Frame, FrameSource, ImageStack, MeasurementDriver, Modality, PliParameter, State,
    Tilt,
};

fn polarimeter(param: SyntheticParameter) -> SyntheticPolarimeter {
    let dictionary = MarkerDictionary::generate(4, 32, 3).unwrap();
    SyntheticPolarimeter::new(param, dictionary)
}

/// Plays back prepared frames in order.
struct Replay(std::vec::IntoIter<Frame>);

impl FrameSource for Replay {
    fn next_frame(&mut self) -> Option<Frame> {
        self.0.next()
    }
}

#[test]
fn test_canonical_angles_in_any_order() {
    let sample = SyntheticSample::default();
    let device = polarimeter(SyntheticParameter {
        noise: 0,
        ..Default::default()
    });
    let mut order: Vec<usize> = (0..18).collect();
    order.shuffle(&mut StdRng::seed_from_u64(3));

    // first frame calibrates, the others are the shuffled canonical angles
    let frames = std::iter::once(0.0)
        .chain(order.iter().map(|&k| k as f64 * PI / 18.0))
        .map(|rho| Frame::Gray(device.render(rho)))
        .collect::<Vec<_>>();
    let mut source = Replay(frames.into_iter());
    let mut driver = MeasurementDriver::new(PliParameter::default()).unwrap();

    assert_eq!(driver.next(&mut source).unwrap().state, State::Measurement);
    for count in 1..=order.len() {
        assert!(!driver.stack().is_full());
        driver.next(&mut source).unwrap();
        assert_eq!(driver.stack().filled_count(), count);
    }
    assert!(driver.stack().is_full());
    assert_eq!(driver.state(), State::Live);
    assert!(driver.wait_for_analysis(Duration::from_secs(60)));

    let shape = driver.tracker().crop_shape().unwrap();
    let direction = driver.direction().unwrap();
    assert_eq!(direction.dim(), shape);
    let d = direction[[shape.0 / 2, shape.1 / 2]] as f64;
    assert!((d - sample.direction).abs() < 0.05, "direction {}", d);
}

#[test]
fn test_measurement_cycle_recovers_sample() {
    let sample = SyntheticSample {
        direction: 0.6,
        retardation: 0.5,
        ..Default::default()
    };
    let mut source = polarimeter(SyntheticParameter {
        rgb: true,
        sample: sample.clone(),
        ..Default::default()
    });
    let param = PliParameter {
        color_mode: ColorMode::Green,
        ..Default::default()
    };
    let mut driver = MeasurementDriver::new(param).unwrap();

    let mut inserted = 0;
    let mut live_at = None;
    for k in 0..100 {
        let before = driver.stack().filled_count();
        let tick = driver.next(&mut source).unwrap();
        if driver.stack().filled_count() > before {
            inserted += 1;
        }
        if tick.state == State::Live {
            live_at = Some(k);
            break;
        }
    }
    assert!(live_at.is_some());
    // the stack completes on its last distinct insertion
    assert_eq!(inserted, 18);
    assert!(driver.wait_for_analysis(Duration::from_secs(60)));

    let shape = driver.tracker().crop_shape().unwrap();
    let direction = driver.direction().unwrap();
    assert_eq!(direction.dim(), shape);
    assert_eq!(driver.fom().unwrap().dim(), (shape.0, shape.1, 3));

    let (cy, cx) = (shape.0 / 2, shape.1 / 2);
    assert!((direction[[cy, cx]] as f64 - sample.direction).abs() < 0.05);
    let retardation = driver.retardation().unwrap();
    assert!((retardation[[cy, cx]] as f64 - sample.retardation).abs() < 0.05);
    let mask = driver.mask().unwrap();
    assert!(mask.iter().filter(|&&m| m).count() > mask.len() / 4);
    // corners lie outside the aperture and stay dark
    assert_eq!(driver.transmittance().unwrap()[[0, 0]], 0.0);
}

#[test]
fn test_exports_after_measurement() {
    let mut source = polarimeter(SyntheticParameter::default());
    let mut driver = MeasurementDriver::new(PliParameter::default()).unwrap();
    assert!(driver.export_images(std::env::temp_dir()).is_err());

    for _ in 0..100 {
        if driver.next(&mut source).unwrap().state == State::Live {
            break;
        }
    }
    assert!(driver.wait_for_analysis(Duration::from_secs(60)));
    let (rows, cols) = driver.tracker().crop_shape().unwrap();
    driver.add_probe(cols / 2, rows / 2, false);
    driver.add_probe(cols / 3, rows / 2, true);
    assert_eq!(driver.probes().len(), 2);

    let dir = std::env::temp_dir().join(format!("pli-measurement-{}", std::process::id()));
    driver.export_images(&dir).unwrap();
    driver.export_plot(dir.join("plot.csv")).unwrap();
    let plot = std::fs::read_to_string(dir.join("plot.csv")).unwrap();
    assert_eq!(plot.lines().count(), 19);

    // plot and stack follow the selected tilt view
    driver.set_tilt(Tilt::North);
    driver.export_plot(dir.join("plot_north.csv")).unwrap();
    let north = std::fs::read_to_string(dir.join("plot_north.csv")).unwrap();
    assert_eq!(north.lines().next(), plot.lines().next());
    assert_ne!(north, plot);
    let tilted = dir.join("north");
    driver.export_images(&tilted).unwrap();
    let cube: ndarray::Array3<f32> = ndarray_npy::read_npy(tilted.join("stack.npy")).unwrap();
    assert_eq!(cube, driver.analysis().unwrap().images(Tilt::North));
    assert!(dir.join("fom.tif").exists());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_shuffled_stack_matches_ordered() {
    let rotations: Vec<f64> = (0..18).map(|k| k as f64 * PI / 18.0).collect();
    let frame = |rho: f64| {
        Array2::<f32>::from_shape_fn((6, 7), |(i, j)| {
            let phi = 0.1 * (i + j) as f64;
            (90.0 * (1.0 + 0.3 * (2.0 * (rho - phi)).sin())) as f32
        })
    };

    let mut ordered = ImageStack::new(18, 4.2_f64.to_radians()).unwrap();
    for &rho in &rotations {
        ordered.insert(&frame(rho).view(), rho).unwrap();
    }
    let mut shuffled = ImageStack::new(18, 4.2_f64.to_radians()).unwrap();
    for k in (0..18).map(|k| (k * 7) % 18) {
        shuffled.insert(&frame(rotations[k]).view(), rotations[k]).unwrap();
    }
    assert!(ordered.is_full() && shuffled.is_full());

    let log = set_log_config();
    let param = AnalysisParameter::default();
    let a = Analysis::run(&ordered.freeze().unwrap(), &param, &log).unwrap();
    let b = Analysis::run(&shuffled.freeze().unwrap(), &param, &log).unwrap();
    for modality in Modality::ALL {
        let (x, y) = (a.modality(Tilt::Center, modality), b.modality(Tilt::Center, modality));
        x.iter().zip(y.iter()).for_each(|(p, q)| assert_approx_eq!(p, q, 1e-4));
    }
    let d = a.modality(Tilt::Center, Modality::Direction);
    assert_approx_eq!(d[[2, 3]] as f64, 0.5, 1e-4);
}

#[test]
fn test_zero_tilt_reproduces_measurement() {
    let mut stack = ImageStack::new(18, 4.2_f64.to_radians()).unwrap();
    for k in 0..18 {
        let rho = k as f64 * PI / 18.0;
        let frame = Array2::<f32>::from_shape_fn((5, 5), |(i, _)| {
            (120.0 * (1.0 + 0.2 * (2.0 * (rho - 0.3 * i as f64)).sin())) as f32
        });
        stack.insert(&frame.view(), rho).unwrap();
    }
    let frozen = stack.freeze().unwrap();
    let analysis =
        Analysis::run(&frozen, &AnalysisParameter::default(), &set_log_config()).unwrap();

    let tilted = simulate_tilt(
        &analysis.modalities,
        &analysis.inclination,
        &analysis.rotations,
        0.0,
        0.0,
        Default::default(),
    )
    .unwrap();
    let error = direction_error(
        &tilted.modalities.direction.view(),
        &analysis.modalities.direction.view(),
    );
    assert!(error.iter().all(|&e| e < 1e-3));
    tilted
        .modalities
        .transmittance
        .iter()
        .zip(analysis.modalities.transmittance.iter())
        .for_each(|(p, q)| assert_approx_eq!(p, q, 1e-2));
}
