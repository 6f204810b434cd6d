use clap::Parser;
use config::{Config, DetectorConfig};
use geometry::reciprocal::ReciprocalGeometry;
use geometry::{
    assemble_image_stack_batch, reciprocal_position_and_corrections, take_n_slices,
    BoundaryPolicy, Quaternion, SliceOptions, SliceVolume, Vector3,
};
use log::{debug, info};
use ndarray::{Array, Array3, Array4, Dimension, RemoveAxis};
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const MM_TO_METER: f64 = 1e-3;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Draw this many random orientations instead of reading quat_file
    #[clap(long, value_parser)]
    pub random: Option<usize>,

    /// Seed for --random
    #[clap(long, value_parser)]
    pub seed: Option<u64>,

    /// Path to config_file
    #[clap(value_parser, value_name = "FILE")]
    pub config: PathBuf,
}

/// A planar detector of identical panels perpendicular to z, stacked along
/// x with a gap between neighbours. Lengths are in metres.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatDetector {
    num_panel: usize,
    num_row: usize,
    num_col: usize,
    px: f64,
    gap: f64,
    detd: f64,
    cx: f64,
    cy: f64,
}

impl FlatDetector {
    pub fn new(config: &DetectorConfig) -> Result<FlatDetector, Box<dyn Error>> {
        if config.num_panel == 0 || config.num_row == 0 || config.num_col == 0 {
            return Err("detector needs at least one panel, row and column".into());
        }
        if !(config.px > 0.) || !(config.detd > 0.) || config.panel_gap < 0. {
            return Err(format!(
                "invalid detector lengths: px = {}, detd = {}, panel_gap = {}",
                config.px, config.detd, config.panel_gap
            )
            .into());
        }
        Ok(FlatDetector {
            num_panel: config.num_panel,
            num_row: config.num_row,
            num_col: config.num_col,
            px: config.px * MM_TO_METER,
            gap: config.panel_gap * MM_TO_METER,
            detd: config.detd * MM_TO_METER,
            cx: config.cx,
            cy: config.cy,
        })
    }

    /// `(panel, row, col)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.num_panel, self.num_row, self.num_col)
    }

    /// Pixel centers, `(panel, row, col, xyz)`. `(cx, cy)` is the beam
    /// position in pixels of the gap-free assembled image.
    pub fn pixel_position(&self) -> Array4<f64> {
        let (_, num_row, num_col) = self.shape();
        Array4::from_shape_fn((self.num_panel, num_row, num_col, 3), |(p, i, j, c)| match c {
            0 => ((p * num_row + i) as f64 - self.cx) * self.px + p as f64 * self.gap,
            1 => (j as f64 - self.cy) * self.px,
            _ => self.detd,
        })
    }

    pub fn pixel_area(&self) -> Array3<f64> {
        Array3::from_elem(self.shape(), self.px * self.px)
    }

    /// Image pixel of every panel pixel; panels are placed one below another.
    pub fn index_map(&self) -> Array4<usize> {
        let (_, num_row, num_col) = self.shape();
        Array4::from_shape_fn((self.num_panel, num_row, num_col, 2), |(p, i, j, c)| match c {
            0 => p * num_row + i,
            _ => j,
        })
    }

    pub fn normal(&self) -> Vector3 {
        [0., 0., 1.]
    }
}

/// Wave vector along the beam direction with length `1 / wl`.
pub fn wave_vector(config: &DetectorConfig) -> Result<Vector3, Box<dyn Error>> {
    let [sx, sy, sz] = config.beam_vec;
    let norm = (sx * sx + sy * sy + sz * sz).sqrt();
    if norm == 0. || !(config.wl > 0.) {
        return Err(format!(
            "invalid beam: direction {:?}, wavelength {}",
            config.beam_vec, config.wl
        )
        .into());
    }
    let k = 1. / config.wl / norm;
    Ok([sx * k, sy * k, sz * k])
}

/// Polarization times solid angle, normalized to a maximum of one.
pub fn scale_factor<D>(geom: &ReciprocalGeometry<D>) -> Array<f64, D::Smaller>
where
    D: Dimension + RemoveAxis,
{
    let mut scale = geom.polarization.clone();
    scale.zip_mut_with(&geom.solid_angle, |s, omega| *s *= omega);
    let max_scale_factor = scale.iter().cloned().fold(0_f64, f64::max);
    if max_scale_factor > 0. {
        scale.mapv_inplace(|s| s / max_scale_factor);
    }
    scale
}

/// Read a cubic volume: `u32` side `N`, `u32` zero, then `N³` little-endian
/// `f64` in row-major order.
pub fn load_volume(path: &Path) -> Result<Array3<f64>, Box<dyn Error>> {
    let file = File::open(path).map_err(|why| format!("couldn't open {}: {why}", path.display()))?;
    let mut fp = BufReader::new(file);

    let mut buf = [0_u8; 4];
    fp.read_exact(&mut buf)?;
    let voxel_num = u32::from_le_bytes(buf) as usize;
    fp.read_exact(&mut buf)?;
    if u32::from_le_bytes(buf) != 0 {
        return Err("Error in volume file".into());
    }

    let num_bytes = voxel_num
        .checked_pow(3)
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(|| format!("volume side {voxel_num} is too large"))?;
    let mut buf = Vec::new();
    fp.take(num_bytes as u64).read_to_end(&mut buf)?;
    if buf.len() != num_bytes {
        return Err(format!(
            "volume file holds {} bytes of data, header claims side {voxel_num}",
            buf.len()
        )
        .into());
    }
    let data: Vec<f64> = buf
        .chunks_exact(8)
        .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect();
    info!("read volume of side {voxel_num} from {}", path.display());
    Ok(Array3::from_shape_vec((voxel_num, voxel_num, voxel_num), data)?)
}

/// Slice `volume` for every orientation, apply the detector corrections and
/// assemble the panels. Returns `(orientation, x, y)` images.
pub fn simulate_patterns(
    config: &Config,
    volume: &Array3<f64>,
    orientations: &[Quaternion],
) -> Result<Array3<f64>, Box<dyn Error>> {
    let detector = FlatDetector::new(&config.detector)?;
    let geom = reciprocal_position_and_corrections(
        &detector.pixel_position(),
        &detector.pixel_area(),
        &wave_vector(&config.detector)?,
        &config.detector.polarization,
        &detector.normal(),
        1.,
    )?;
    let scale = scale_factor(&geom);
    debug!("detector {:?}, {} pixels", detector.shape(), scale.len());

    let options = SliceOptions {
        inverse: config.slices.inverse,
        boundary: config.slices.boundary.parse::<BoundaryPolicy>()?,
    };
    let volume = SliceVolume::new(volume.view(), config.slices.voxel_length)?;
    let mut slices = take_n_slices(&geom.positions, &volume, orientations, &options)?;
    for mut slice in slices.outer_iter_mut() {
        slice *= &scale;
    }
    Ok(assemble_image_stack_batch(&slices, &detector.index_map())?)
}
