use configparser::ini::Ini;
use std::error::Error;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

/// `[files]`
#[derive(Debug, Clone, PartialEq)]
pub struct FilesConfig {
    pub data_dir: String,
    pub quat_file: String,
    pub volume_file: String,
}

/// `[make_detector]`: lengths in mm, beam center in pixels, wavelength in Å.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub num_panel: usize,
    pub panel_gap: f64,
    pub num_row: usize,
    pub num_col: usize,
    pub detd: f64,
    pub px: f64,
    pub cx: f64,
    pub cy: f64,
    pub wl: f64,
    pub beam_vec: [f64; 3],
    pub polarization: [f64; 3],
}

/// `[take_slices]`
#[derive(Debug, Clone, PartialEq)]
pub struct SliceConfig {
    pub voxel_length: f64,
    pub inverse: bool,
    pub boundary: String,
    pub nproc: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub files: FilesConfig,
    pub detector: DetectorConfig,
    pub slices: SliceConfig,
}

fn load(path: &Path) -> Result<Ini, Box<dyn Error>> {
    let mut config = Ini::new();
    config
        .load(path)
        .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
    Ok(config)
}

fn get(config: &Ini, section: &str, key: &str) -> Result<String, Box<dyn Error>> {
    config
        .get(section, key)
        .ok_or_else(|| format!("missing key '{key}' in section [{section}]").into())
}

fn parse<T>(config: &Ini, section: &str, key: &str) -> Result<T, Box<dyn Error>>
where
    T: FromStr,
    T::Err: Display,
{
    get(config, section, key)?
        .trim()
        .parse::<T>()
        .map_err(|e| format!("invalid value for '{key}' in section [{section}]: {e}").into())
}

fn parse_vec(config: &Ini, section: &str, keys: [&str; 3]) -> Result<[f64; 3], Box<dyn Error>> {
    Ok([
        parse(config, section, keys[0])?,
        parse(config, section, keys[1])?,
        parse(config, section, keys[2])?,
    ])
}

impl FilesConfig {
    pub fn new(path: &Path) -> Result<FilesConfig, Box<dyn Error>> {
        Self::from_ini(&load(path)?)
    }

    fn from_ini(config: &Ini) -> Result<FilesConfig, Box<dyn Error>> {
        Ok(FilesConfig {
            data_dir: get(config, "files", "data_dir")?,
            quat_file: get(config, "files", "quat_file")?,
            volume_file: get(config, "files", "volume_file")?,
        })
    }
}

impl DetectorConfig {
    fn from_ini(config: &Ini) -> Result<DetectorConfig, Box<dyn Error>> {
        let section = "make_detector";
        Ok(DetectorConfig {
            num_panel: parse(config, section, "num_panel")?,
            panel_gap: parse(config, section, "panel_gap")?,
            num_row: parse(config, section, "num_row")?,
            num_col: parse(config, section, "num_col")?,
            detd: parse(config, section, "detd")?,
            px: parse(config, section, "px")?,
            cx: parse(config, section, "cx")?,
            cy: parse(config, section, "cy")?,
            wl: parse(config, section, "wl")?,
            beam_vec: parse_vec(config, section, ["sx", "sy", "sz"])?,
            polarization: parse_vec(config, section, ["pol_x", "pol_y", "pol_z"])?,
        })
    }
}

impl SliceConfig {
    fn from_ini(config: &Ini) -> Result<SliceConfig, Box<dyn Error>> {
        let section = "take_slices";
        let inverse = config
            .getboolcoerce(section, "inverse")?
            .ok_or_else(|| format!("missing key 'inverse' in section [{section}]"))?;
        Ok(SliceConfig {
            voxel_length: parse(config, section, "voxel_length")?,
            inverse,
            boundary: get(config, section, "boundary")?.trim().to_string(),
            nproc: parse(config, section, "nproc")?,
        })
    }
}

impl Config {
    pub fn new(path: &Path) -> Result<Config, Box<dyn Error>> {
        let config = load(path)?;
        Ok(Config {
            files: FilesConfig::from_ini(&config)?,
            detector: DetectorConfig::from_ini(&config)?,
            slices: SliceConfig::from_ini(&config)?,
        })
    }
}
