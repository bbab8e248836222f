use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::{ImageBuffer, Luma, Rgb, RgbImage};
use marker_tracker::utils::clamp;
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};
use ndarray_npy::write_npy;

use crate::analysis::{Analysis, Modality};
use crate::error::PliError;
use crate::tilt::Tilt;

/// `value / full_scale * 255`, clamped to the 8 bit range.
pub fn to_display_u8(map: &ArrayView2<f32>, full_scale: f32) -> Array2<u8> {
    map.mapv(|v| {
        if v.is_nan() {
            0
        } else {
            clamp(v / full_scale * 255.0, 0.0, 255.0).round() as u8
        }
    })
}

fn to_gray16(map: &ArrayView2<f32>, full_scale: f32) -> ImageBuffer<Luma<u16>, Vec<u16>> {
    let (height, width) = map.dim();
    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        let v = map[(y as usize, x as usize)];
        let v = if v.is_nan() { 0.0 } else { v / full_scale };
        Luma([(clamp(v, 0.0, 1.0) * u16::MAX as f32).round() as u16])
    })
}

fn fom_to_rgb8(fom: &ArrayView3<f32>) -> RgbImage {
    let (height, width, _) = fom.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let px = |c: usize| {
            (clamp(fom[(y as usize, x as usize, c)], 0.0, 1.0) * 255.0).round() as u8
        };
        Rgb([px(0), px(1), px(2)])
    })
}

/// Intensity of every probe point (`[x, y]` in stack coordinates) against the
/// rotation angle, as comma separated text. Probes outside the images are
/// skipped.
pub fn export_plot<P: AsRef<Path>>(
    path: P,
    rotations: &[f64],
    probes: &[[usize; 2]],
    images: &ArrayView3<f32>,
) -> Result<(), PliError> {
    let (n, h, w) = images.dim();
    if n != rotations.len() {
        return Err(PliError::ShapeMismatch {
            expected: vec![rotations.len()],
            actual: vec![n],
        });
    }
    let probes = probes
        .iter()
        .filter(|p| p[0] < w && p[1] < h)
        .collect::<Vec<_>>();

    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "rho")?;
    for p in &probes {
        write!(out, ",x{}y{}", p[0], p[1])?;
    }
    writeln!(out)?;
    for (rho, image) in rotations.iter().zip(images.axis_iter(Axis(0))) {
        write!(out, "{:.6}", rho)?;
        for p in &probes {
            write!(out, ",{:.6}", image[(p[1], p[0])])?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Write the rotations, every modality as a 16 bit TIFF and a raw `.npy`, the
/// FOM as an RGB TIFF and the image stack of the `tilt` view into `dir`.
pub fn export_images<P: AsRef<Path>>(
    dir: P,
    analysis: &Analysis,
    tilt: Tilt,
) -> Result<(), PliError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut rotations = BufWriter::new(File::create(dir.join("rotations.txt"))?);
    for rho in &analysis.rotations {
        writeln!(rotations, "{:.6}", rho)?;
    }
    rotations.flush()?;

    for modality in Modality::ALL {
        let map = analysis.modality(tilt, modality);
        to_gray16(&map.view(), modality.full_scale())
            .save(dir.join(format!("{}.tif", modality.name())))?;
        write_npy(dir.join(format!("{}.npy", modality.name())), &map)?;
    }
    let fom = analysis.fom(tilt);
    fom_to_rgb8(&fom.view()).save(dir.join("fom.tif"))?;
    write_npy(dir.join("fom.npy"), fom)?;
    write_npy(dir.join("stack.npy"), &analysis.images(tilt))?;
    Ok(())
}
