use clap::{Parser, ValueEnum};
use geometry::{points_on_1sphere, points_on_2sphere, random_quaternions, Quaternion, RotationAxis};
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// How the orientations are generated
    #[clap(long, value_enum, default_value_t = OrientationMode::Uniform)]
    pub mode: OrientationMode,

    /// Rotation axis for circle mode: x, y or z
    #[clap(long, value_parser, default_value = "z")]
    pub axis: RotationAxis,

    /// Seed for random mode
    #[clap(long, value_parser)]
    pub seed: Option<u64>,

    /// Save as binary file
    #[clap(long, parse(from_flag))]
    pub bin: bool,

    /// Path to config_file
    #[clap(value_parser, value_name = "FILE")]
    pub config: std::path::PathBuf,

    /// Number of orientations
    #[clap(value_parser)]
    pub num_pts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrientationMode {
    /// Even sweep of the unit 3-sphere
    Uniform,
    /// Uniformly random unit quaternions
    Random,
    /// Even steps about a single axis
    Circle,
}

impl OrientationMode {
    pub fn name(&self) -> &'static str {
        match self {
            OrientationMode::Uniform => "uniform",
            OrientationMode::Random => "random",
            OrientationMode::Circle => "circle",
        }
    }
}

/// An orientation together with its weight in the quaternion file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedQuat {
    pub quat: Quaternion,
    pub weight: f64,
}

pub fn generate(
    mode: OrientationMode,
    num_pts: usize,
    axis: &RotationAxis,
    seed: Option<u64>,
) -> Result<Vec<Quaternion>, Box<dyn Error>> {
    let quats = match mode {
        OrientationMode::Uniform => points_on_2sphere(num_pts),
        OrientationMode::Random => {
            let mut rng = match seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            random_quaternions(num_pts, &mut rng)
        }
        OrientationMode::Circle => points_on_1sphere(num_pts, axis)?,
    };
    Ok(quats)
}

/// Equal weights summing to one.
pub fn with_uniform_weight(quats: &[Quaternion]) -> Vec<WeightedQuat> {
    let weight = 1. / quats.len() as f64;
    quats
        .iter()
        .map(|&quat| WeightedQuat { quat, weight })
        .collect()
}

pub fn output_filename(mode: OrientationMode, num_pts: usize, bin: bool) -> String {
    let ext = if bin { "bin" } else { "dat" };
    format!("c_quaternion_{}{num_pts}.{ext}", mode.name())
}

/// One `w x y z weight` line per orientation.
pub fn write_quaternion_dat<W: Write>(fp: &mut W, quats: &[WeightedQuat]) -> Result<(), Box<dyn Error>> {
    for q in quats {
        let [w, x, y, z] = q.quat.to_array();
        writeln!(fp, "{:.12} {:.12} {:.12} {:.12} {:.12}", w, x, y, z, q.weight)?;
    }
    Ok(())
}

/// `u32` count, `u32` zero, then five little-endian `f64` per orientation.
pub fn write_quaternion_bin<W: Write>(fp: &mut W, quats: &[WeightedQuat]) -> Result<(), Box<dyn Error>> {
    let num_rot = u32::try_from(quats.len())?;
    fp.write_all(&num_rot.to_le_bytes())?;
    fp.write_all(&0_u32.to_le_bytes())?;
    for q in quats {
        for v in q.quat.to_array() {
            fp.write_all(&v.to_le_bytes())?;
        }
        fp.write_all(&q.weight.to_le_bytes())?;
    }
    Ok(())
}

fn read_quaternion_bin<R: Read>(fp: &mut R) -> Result<Vec<WeightedQuat>, Box<dyn Error>> {
    let mut buf = [0_u8; 4];
    fp.read_exact(&mut buf)?;
    let num_rot = u32::from_le_bytes(buf) as usize;
    fp.read_exact(&mut buf)?;
    if u32::from_le_bytes(buf) != 0 {
        return Err("Error in quat file".into());
    }

    let num_bytes = num_rot
        .checked_mul(40)
        .ok_or_else(|| format!("quat file header claims too many orientations: {num_rot}"))?;
    // the buffer grows with the data actually present, not with the header
    let mut buf = Vec::new();
    fp.take(num_bytes as u64).read_to_end(&mut buf)?;
    if buf.len() != num_bytes {
        return Err(format!(
            "quat file holds {} bytes of records, header claims {num_rot} orientations",
            buf.len()
        )
        .into());
    }
    let values: Vec<f64> = buf
        .chunks_exact(8)
        .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect();
    Ok(values
        .chunks_exact(5)
        .map(|r| WeightedQuat {
            quat: Quaternion::new(r[0], r[1], r[2], r[3]),
            weight: r[4],
        })
        .collect())
}

fn read_quaternion_dat<R: BufRead>(fp: R) -> Result<Vec<WeightedQuat>, Box<dyn Error>> {
    let mut quats = Vec::new();
    for (n, line) in fp.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let values = line
            .split_whitespace()
            .map(|v| v.parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()?;
        if values.len() != 5 {
            return Err(format!("line {}: expected 5 columns, found {}", n + 1, values.len()).into());
        }
        quats.push(WeightedQuat {
            quat: Quaternion::new(values[0], values[1], values[2], values[3]),
            weight: values[4],
        });
    }
    Ok(quats)
}

/// Read a quaternion file, binary when the extension is `.bin` and text otherwise.
pub fn load_quaternions(path: &Path) -> Result<Vec<WeightedQuat>, Box<dyn Error>> {
    let file = File::open(path).map_err(|why| format!("couldn't open {}: {why}", path.display()))?;
    let quats = match path.extension().and_then(|e| e.to_str()) {
        Some("bin") => read_quaternion_bin(&mut BufReader::new(file))?,
        _ => read_quaternion_dat(BufReader::new(file))?,
    };
    info!("read {} orientations from {}", quats.len(), path.display());
    Ok(quats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::BufWriter;

    fn sample() -> Vec<WeightedQuat> {
        with_uniform_weight(&generate(OrientationMode::Uniform, 10, &RotationAxis::Z, None).unwrap())
    }

    #[test]
    fn test_modes_produce_requested_count() {
        for mode in [OrientationMode::Uniform, OrientationMode::Random, OrientationMode::Circle] {
            let quats = generate(mode, 12, &RotationAxis::Y, Some(3)).unwrap();
            assert_eq!(quats.len(), 12);
            for q in quats.iter() {
                assert_abs_diff_eq!(q.norm(), 1., epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_seeded_random_mode_is_reproducible() {
        let a = generate(OrientationMode::Random, 5, &RotationAxis::Z, Some(11)).unwrap();
        let b = generate(OrientationMode::Random, 5, &RotationAxis::Z, Some(11)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = sample().iter().map(|q| q.weight).sum();
        assert_abs_diff_eq!(total, 1., epsilon = 1e-12);
    }

    #[test]
    fn test_output_filename() {
        assert_eq!(output_filename(OrientationMode::Circle, 36, false), "c_quaternion_circle36.dat");
        assert_eq!(output_filename(OrientationMode::Uniform, 100, true), "c_quaternion_uniform100.bin");
    }

    #[test]
    fn test_binary_layout() {
        let quats = sample();
        let mut bytes = Vec::new();
        write_quaternion_bin(&mut bytes, &quats).unwrap();
        assert_eq!(bytes.len(), 8 + 40 * quats.len());
        assert_eq!(&bytes[0..4], &10_u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..16], &quats[0].quat.w.to_le_bytes());
        assert_eq!(read_quaternion_bin(&mut bytes.as_slice()).unwrap(), quats);

        bytes[4] = 1;
        assert!(read_quaternion_bin(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_header_larger_than_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c_quaternion_uniform0.bin");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&0_u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();
        assert!(load_quaternions(&path).is_err());

        // one record short
        let quats = sample();
        let mut bytes = Vec::new();
        write_quaternion_bin(&mut bytes, &quats).unwrap();
        bytes.truncate(bytes.len() - 40);
        assert!(read_quaternion_bin(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_files_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let quats = sample();

        let bin_path = dir.path().join(output_filename(OrientationMode::Uniform, 10, true));
        let mut fp = BufWriter::new(File::create(&bin_path).unwrap());
        write_quaternion_bin(&mut fp, &quats).unwrap();
        drop(fp);
        assert_eq!(load_quaternions(&bin_path).unwrap(), quats);

        let dat_path = dir.path().join(output_filename(OrientationMode::Uniform, 10, false));
        let mut fp = BufWriter::new(File::create(&dat_path).unwrap());
        write_quaternion_dat(&mut fp, &quats).unwrap();
        drop(fp);
        let loaded = load_quaternions(&dat_path).unwrap();
        assert_eq!(loaded.len(), quats.len());
        for (a, b) in loaded.iter().zip(quats.iter()) {
            assert_abs_diff_eq!(a.quat.w, b.quat.w, epsilon = 1e-12);
            assert_abs_diff_eq!(a.quat.z, b.quat.z, epsilon = 1e-12);
            assert_abs_diff_eq!(a.weight, b.weight, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_malformed_text_file() {
        let bad = "1.0 0.0 0.0 0.0\n";
        assert!(read_quaternion_dat(bad.as_bytes()).is_err());
        assert!(load_quaternions(Path::new("/nonexistent/quat.dat")).is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "make_quaternion",
            "--mode",
            "circle",
            "--axis",
            "y",
            "--bin",
            "config.ini",
            "36",
        ])
        .unwrap();
        assert_eq!(args.mode, OrientationMode::Circle);
        assert_eq!(args.axis, RotationAxis::Y);
        assert!(args.bin);
        assert_eq!(args.num_pts, 36);

        let args = Args::try_parse_from(["make_quaternion", "config.ini", "5"]).unwrap();
        assert_eq!(args.mode, OrientationMode::Uniform);
        assert_eq!(args.axis, RotationAxis::Z);
        assert_eq!(args.seed, None);
    }
}
