//! End-to-end runs: GeoTIFF inputs on disk → load and validate → trace →
//! GeoTIFF output, read back and checked.

use approx::assert_relative_eq;
use bmptrace_algorithms::hydrology::{bmp_trace, d8, load_grids, TraceParams};
use bmptrace_algorithms::strategy::ProcessingMode;
use bmptrace_core::io::{read_geotiff, write_geotiff, GeoTiffOptions, GridSource};
use bmptrace_core::{AlignmentAttribute, GeoTransform, Raster};
use tempfile::TempDir;

const CELL: f64 = 30.0;
const LOWER_LEFT: (f64, f64) = (356_010.0, 4_567_980.0);

/// Hill peaking in the middle of the grid, so every cell drains outward.
fn hill_dem(rows: usize, cols: usize) -> Raster<f64> {
    let mut dem = Raster::new(rows, cols);
    let (cr, cc) = (rows as f64 / 2.0, cols as f64 / 2.0);
    for row in 0..rows {
        for col in 0..cols {
            let dr = row as f64 - cr;
            let dc = col as f64 - cc;
            let noise = ((row * 7 + col * 13) % 17) as f64 * 0.001;
            dem.set(row, col, 1000.0 - (dr * dr + dc * dc).sqrt() + noise).unwrap();
        }
    }
    dem
}

/// Steepest-descent power-of-two D8 codes. Edge cells without a lower
/// neighbor drain straight off the grid.
fn d8_codes(dem: &Raster<f64>) -> Raster<i32> {
    let (rows, cols) = dem.shape();
    let mut fdir = Raster::new(rows, cols);
    fdir.set_transform(GeoTransform::from_lower_left(LOWER_LEFT.0, LOWER_LEFT.1, CELL, rows));

    for row in 0..rows {
        for col in 0..cols {
            let z = dem.get(row, col).unwrap();
            let mut best = (0.0, if col + 1 == cols { 1 } else { 64 });
            for (&code, &(dr, dc)) in d8::D8_CODES.iter().zip(d8::D8_OFFSETS.iter()) {
                let (nr, nc) = (row as isize + dr, col as isize + dc);
                if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                    continue;
                }
                let dist = if dr != 0 && dc != 0 { std::f64::consts::SQRT_2 } else { 1.0 };
                let drop = (z - dem.get(nr as usize, nc as usize).unwrap()) / dist;
                if drop > best.0 {
                    best = (drop, code);
                }
            }
            fdir.set(row, col, best.1).unwrap();
        }
    }
    fdir
}

fn effectiveness(rows: usize, cols: usize) -> Raster<f64> {
    let mut eff = Raster::filled(rows, cols, -9999.0);
    eff.set_nodata(Some(-9999.0));
    eff.set_transform(GeoTransform::from_lower_left(LOWER_LEFT.0, LOWER_LEFT.1, CELL, rows));
    // A handful of BMP sites
    for &(r, c, v) in &[(10, 10, 0.5), (20, 31, 0.25), (33, 12, 1.0), (5, 30, 0.75)] {
        eff.set(r, c, v).unwrap();
    }
    eff
}

#[test]
fn geotiff_pipeline_roundtrip() {
    let (rows, cols) = (40, 48);
    let dir = TempDir::new().unwrap();
    let fdir_path = dir.path().join("flowdir.tif");
    let eff_path = dir.path().join("bmp.tif");
    let out_path = dir.path().join("unmitigated.tif");

    let fdir = d8_codes(&hill_dem(rows, cols));
    write_geotiff(&fdir, &fdir_path, None).unwrap();
    write_geotiff(
        &effectiveness(rows, cols),
        &eff_path,
        Some(GeoTiffOptions {
            nodata: Some(-9999.0),
        }),
    )
    .unwrap();

    let (flow_dir, bmp, placement) =
        load_grids(&GridSource::geotiff(&fdir_path), &GridSource::geotiff(&eff_path)).unwrap();
    assert_eq!((placement.rows, placement.cols), (rows, cols));
    assert_relative_eq!(placement.cell_size, CELL);
    assert_relative_eq!(placement.lower_left.0, LOWER_LEFT.0, epsilon = 1e-6);
    assert_relative_eq!(placement.lower_left.1, LOWER_LEFT.1, epsilon = 1e-6);
    assert_eq!(bmp.nodata(), Some(-9999.0));

    let outcome = bmp_trace(&flow_dir, &bmp, TraceParams::default()).unwrap();
    assert!(outcome.diverged.is_empty());
    assert_eq!(outcome.traces, (rows - 2) * (cols - 2));

    write_geotiff(&outcome.output, &out_path, None).unwrap();
    let written: Raster<f64> = read_geotiff(&out_path).unwrap();

    assert_eq!(written.shape(), (rows, cols));
    assert_eq!(written.transform(), outcome.output.transform());
    assert_eq!(written.data(), outcome.output.data());

    // A fully effective BMP cell contributes nothing of its own
    let sum: f64 = written.data().iter().sum();
    assert!(sum < outcome.steps as f64);
    assert!(sum > 0.0);
}

#[test]
fn unmitigated_total_equals_steps() {
    let (rows, cols) = (25, 25);
    let fdir = d8_codes(&hill_dem(rows, cols));
    let mut eff = Raster::filled(rows, cols, 0.0);
    eff.set_transform(*fdir.transform());

    let outcome = bmp_trace(
        &fdir,
        &eff,
        TraceParams {
            mode: ProcessingMode::Sequential,
            ..Default::default()
        },
    )
    .unwrap();

    let sum: f64 = outcome.output.data().iter().sum();
    assert_eq!(sum, outcome.steps as f64);

    // Every start cell lies on its own trace
    for row in 1..rows - 1 {
        for col in 1..cols - 1 {
            assert!(outcome.output.get(row, col).unwrap() >= 1.0);
        }
    }
}

#[test]
fn misaligned_files_are_rejected() {
    let dir = TempDir::new().unwrap();
    let fdir_path = dir.path().join("flowdir.tif");
    let eff_path = dir.path().join("bmp.tif");

    let fdir = d8_codes(&hill_dem(12, 12));
    write_geotiff(&fdir, &fdir_path, None).unwrap();

    let mut shifted = Raster::filled(12, 12, 0.0_f64);
    shifted.set_transform(GeoTransform::from_lower_left(
        LOWER_LEFT.0 + CELL,
        LOWER_LEFT.1,
        CELL,
        12,
    ));
    write_geotiff(&shifted, &eff_path, None).unwrap();

    let err = load_grids(&GridSource::geotiff(&fdir_path), &GridSource::geotiff(&eff_path))
        .unwrap_err();
    assert_eq!(err.alignment_attribute(), Some(AlignmentAttribute::XOrigin));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let result = load_grids(
        &GridSource::geotiff(dir.path().join("nope.tif")),
        &GridSource::geotiff(dir.path().join("nope.tif")),
    );
    assert!(matches!(result, Err(bmptrace_core::Error::Io(_))));
}
