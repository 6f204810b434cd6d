use clap::Parser;
use config::FilesConfig;
use log::info;
use make_quaternion::{
    generate, output_filename, with_uniform_weight, write_quaternion_bin, write_quaternion_dat,
    Args, OrientationMode,
};
use std::error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

fn main() -> Result<(), Box<dyn error::Error>> {
    env_logger::init();
    let now = Instant::now();
    let args = Args::parse();

    let data_dir = FilesConfig::new(&args.config)?.data_dir;
    if args.num_pts == 0 {
        return Err("number of orientations must be positive".into());
    }

    match (args.mode, args.bin) {
        (OrientationMode::Circle, true) => info!("circle about {:?}, output format: binary", args.axis),
        (OrientationMode::Circle, false) => info!("circle about {:?}", args.axis),
        (mode, true) => info!("{} orientations, output format: binary", mode.name()),
        (mode, false) => info!("{} orientations", mode.name()),
    }

    let quats = generate(args.mode, args.num_pts, &args.axis, args.seed)?;
    let quats = with_uniform_weight(&quats);
    info!("num_rot = {}", quats.len());

    let filename = output_filename(args.mode, args.num_pts, args.bin);
    let path: PathBuf = [data_dir, filename].iter().collect();
    let mut fp = BufWriter::new(File::create(&path)?);
    match args.bin {
        true => write_quaternion_bin(&mut fp, &quats)?,
        false => write_quaternion_dat(&mut fp, &quats)?,
    }
    fp.flush()?;

    info!("wrote {} in {:?}", path.display(), now.elapsed());
    Ok(())
}
