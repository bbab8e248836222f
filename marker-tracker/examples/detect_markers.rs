//Detect and decode the square markers of a gray image

use clap::Parser;
use marker_tracker::{
    marker_detector::{MarkerDetectionParameter, MarkerDetector, SquareMarkerDetector},
    rotation_tracker::{Tracker, TrackerParameter},
    utils::ImageUtil,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    //path to the image file
    #[arg(short, long)]
    image_path: String,

    //markers printed on the ring
    #[arg(short, long, default_value_t = 10)]
    num_markers: usize,
}

fn main() {
    let args = Args::parse();
    let image = ImageUtil::read_gray(&args.image_path).expect("could not read image");
    let marker_param = MarkerDetectionParameter::default();
    let detector =
        SquareMarkerDetector::new(marker_param).expect("could not build the marker dictionary");
    detector
        .detect(&image.view())
        .iter()
        .for_each(|det| println!("{}: {:?}", det.id, det.center()));

    let mut tracker = Tracker::new(TrackerParameter::new(args.num_markers, 0), detector);
    if tracker.calibrate(&image.view()) {
        let reference = tracker.calibration().expect("calibrated tracker has a reference");
        println!(
            "aperture center {:?} radius {:.1}, zero marker at {:.2} deg",
            reference.center(),
            reference.radius(),
            reference.zero_angle().to_degrees()
        );
    } else {
        println!("marker ring incomplete, no calibration");
    }
}
