//Run a full measurement against the simulated polarimeter and export the maps

use std::time::Duration;

use clap::Parser;
use marker_tracker::encoding::MarkerDictionary;
use pli::source::{SyntheticParameter, SyntheticPolarimeter};
use pli::{MeasurementDriver, PliParameter, State};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    //number of frames the simulated device delivers
    #[arg(short, long, default_value_t = 120)]
    frames: usize,

    //polarizer rotation per frame in degrees
    #[arg(short, long, default_value_t = 2.0)]
    step: f64,

    //largest distance between a frame and its slot in degrees
    #[arg(short, long, default_value_t = 4.2)]
    insert_threshold: f64,

    //rotation offset applied after the first analysis in degrees
    #[arg(long)]
    offset: Option<f64>,

    //directory receiving the exported maps
    #[arg(short, long, default_value = "pli_output")]
    output_dir: String,

    //draw the tracking overlay
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();
    let param = PliParameter::new(18, args.insert_threshold);
    let dictionary = MarkerDictionary::generate(
        param.markers.bits,
        param.markers.dictionary_size,
        param.markers.min_distance,
    )
    .expect("could not build the marker dictionary");
    let mut source = SyntheticPolarimeter::new(
        SyntheticParameter {
            frames: args.frames,
            step: args.step.to_radians(),
            ..Default::default()
        },
        dictionary,
    );

    let mut driver = MeasurementDriver::new(param).expect("could not create the driver");
    if args.debug {
        driver.switch_debug();
    }
    for _ in 0..args.frames {
        let tick = driver.next(&mut source).expect("frame processing failed");
        if tick.refresh {
            println!(
                "{:?} at {:.2} deg, {}/{} slots",
                tick.state,
                tick.angle.unwrap_or(0.0).to_degrees(),
                driver.stack().filled_count(),
                driver.stack().len()
            );
        }
        if tick.state == State::Live {
            break;
        }
    }
    if !driver.wait_for_analysis(Duration::from_secs(120)) {
        println!("no complete stack after {} frames", args.frames);
        return;
    }
    if let Some(offset) = args.offset {
        driver.apply_offset_deg(offset);
        driver.wait_for_analysis(Duration::from_secs(120));
    }

    let (rows, cols) = driver.tracker().crop_shape().expect("tracker lost calibration");
    driver.add_probe(cols / 2, rows / 2, false);
    driver
        .export_images(&args.output_dir)
        .expect("could not export images");
    driver
        .export_plot(std::path::Path::new(&args.output_dir).join("plot.csv"))
        .expect("could not export plot");
    println!("maps written to {}", args.output_dir);
}
