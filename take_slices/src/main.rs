use clap::Parser;
use config::Config;
use geometry::{random_quaternions, Quaternion};
use log::info;
use make_quaternion::load_quaternions;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::error;
use std::path::Path;
use std::time::Instant;
use take_slices::{load_volume, simulate_patterns, Args};

fn main() -> Result<(), Box<dyn error::Error>> {
    env_logger::init();
    let now = Instant::now();
    let args = Args::parse();
    let config = Config::new(&args.config)?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.slices.nproc)
        .build_global()?;

    let orientations: Vec<Quaternion> = match args.random {
        Some(num_pts) => {
            let mut rng = match args.seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            random_quaternions(num_pts, &mut rng)
        }
        None => load_quaternions(Path::new(&config.files.quat_file))?
            .into_iter()
            .map(|q| q.quat)
            .collect(),
    };
    info!("num_rot = {}", orientations.len());

    let volume = load_volume(Path::new(&config.files.volume_file))?;
    let images = simulate_patterns(&config, &volume, &orientations)?;

    for (l, image) in images.outer_iter().enumerate() {
        let min = image.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = image.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mean = image.mean().unwrap_or(0.);
        info!("pattern {l}: min = {min:.6e}, max = {max:.6e}, mean = {mean:.6e}");
    }

    info!("Time elapsed: {:?}", now.elapsed());
    Ok(())
}
