mod evaluate;

use vidnoise::options::{Options, Phase};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut opts = Options::from_env();

    let default_level = if opts.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    opts.validate()?;
    opts.apply_suffix()?;

    println!("{}", opts.format_options()?);
    let opts_file = opts.save_options()?;
    log::info!("📝 Options saved to {}", opts_file.display());

    let gpu_ids = opts.gpu_ids()?;
    if !gpu_ids.is_empty() {
        log::warn!("gpu ids {gpu_ids:?} requested, frames are processed on the CPU");
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(opts.num_threads)
        .build_global()?;

    match &opts.phase {
        Phase::Train(_) => {
            log::warn!("no trainer is bundled, the train options were only saved");
            Ok(())
        }
        Phase::Test(test) => evaluate::run(&opts, test),
    }
}
