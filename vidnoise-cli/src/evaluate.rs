use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;

use vidnoise::denoise::{
    denoise_sequence_with, denoised_length,
    metrics::batch_psnr,
    noise::{add_video_gaussian_noise, NoiseLevel},
    ExecutionStrategy, SequenceDenoiseConfig, TemporalMeanDenoiser,
    TemporalWienerDenoiser,
};
use vidnoise::image::convert::frame_to_image;
use vidnoise::io::{png::write_frame_png, LoaderConfig, SequenceLoader};
use vidnoise::options::{ModelKind, Options, TestOptions};
use vidnoise::tensor::{CachingAllocator, CpuAllocator, Tensor3, Tensor5, TensorAllocator};

type Error = Box<dyn std::error::Error>;

/// Add noise to every batch of the file list, denoise it and report the PSNR.
pub fn run(opts: &Options, test: &TestOptions) -> Result<(), Error> {
    let file_list = opts
        .file_list
        .as_ref()
        .ok_or("--file-list is required for the test phase")?;

    // frames are not resized, so only an explicit crop is applied
    let config = LoaderConfig {
        batch_size: opts.batch_size,
        sequence_length: opts.sequence_length,
        crop_size: opts.crop_size,
        step: opts.frame_step,
        stride: opts.temp_stride,
        random_shuffle: false,
        epoch_size: -1,
        normalized: true,
        seed: opts.seed,
    };

    let alloc = CachingAllocator::new();
    let mut loader = SequenceLoader::new(file_list, config, alloc.clone())?;
    log::info!(
        "🚀 Found {} sequences in {}, {} batches",
        loader.len(),
        file_list.display(),
        loader.num_batches()
    );

    let denoise_config = SequenceDenoiseConfig {
        stride: test.window_stride,
        strategy: if test.parallel {
            ExecutionStrategy::Parallel
        } else {
            ExecutionStrategy::Serial
        },
    };

    let out_dir = test.results_dir.join(&opts.task_name);
    if test.save_frames {
        std::fs::create_dir_all(&out_dir)?;
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let level = NoiseLevel::Fixed(test.noise_sigma);

    let pb = ProgressBar::new(loader.num_batches() as u64);
    pb.set_style(ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} ({eta}) {msg}",
    )?.progress_chars("##>-"));

    let (mut psnr_noisy, mut psnr_denoised, mut num_batches) = (0.0f32, 0.0f32, 0usize);

    for (batch_idx, batch) in loader.by_ref().enumerate() {
        let batch = batch?;
        let (noisy, noise_map) = add_video_gaussian_noise(&batch.frames, level, &mut rng)?;

        let denoised = match opts.model {
            ModelKind::TemporalMean => denoise_sequence_with(
                &noisy,
                &noise_map,
                &TemporalMeanDenoiser::new(opts.window_size),
                &denoise_config,
            )?,
            ModelKind::TemporalWiener => denoise_sequence_with(
                &noisy,
                &noise_map,
                &TemporalWienerDenoiser::new(opts.window_size),
                &denoise_config,
            )?,
        };

        let clean = centre_frames(&batch.frames, opts.window_size, test.window_stride)?;
        let noisy_centres = centre_frames(&noisy, opts.window_size, test.window_stride)?;

        psnr_noisy += batch_psnr(&noisy_centres, &clean, 1.0)?;
        psnr_denoised += batch_psnr(&denoised, &clean, 1.0)?;
        num_batches += 1;

        if test.save_frames {
            save_frames(&out_dir, batch_idx, &denoised)?;
        }

        pb.set_message(format!(
            "PSNR {:.2} dB",
            psnr_denoised / num_batches as f32
        ));
        pb.inc(1);
    }
    pb.finish();

    if num_batches == 0 {
        log::warn!("no batch was evaluated");
        return Ok(());
    }

    let denoiser_name = opts.model.to_string();
    log::info!(
        "🔥 {}: noisy PSNR {:.2} dB, denoised PSNR {:.2} dB over {} batches",
        denoiser_name,
        psnr_noisy / num_batches as f32,
        psnr_denoised / num_batches as f32,
        num_batches
    );
    log::debug!("memory: {:?}", alloc.stats());

    Ok(())
}

/// Clean frames aligned with the denoised output, frame `i * stride + window_size / 2`.
fn centre_frames<A: TensorAllocator>(
    frames: &Tensor5<f32, A>,
    window_size: usize,
    stride: usize,
) -> Result<Tensor5<f32, A>, Error> {
    let [b, t, c, h, w] = frames.shape;
    let len = denoised_length(t, window_size, stride)
        .ok_or("sequences are shorter than the denoiser window")?;

    let numel = c * h * w;
    let mut data = Vec::with_capacity(b * len * numel);
    for sample in frames.as_slice().chunks_exact((t * numel).max(1)) {
        for i in 0..len {
            let f = i * stride + window_size / 2;
            data.extend_from_slice(&sample[f * numel..(f + 1) * numel]);
        }
    }

    Ok(Tensor5::from_shape_vec(
        [b, len, c, h, w],
        data,
        frames.alloc().clone(),
    )?)
}

fn save_frames<A: TensorAllocator>(
    out_dir: &Path,
    batch_idx: usize,
    frames: &Tensor5<f32, A>,
) -> Result<(), Error> {
    let [b, len, c, h, w] = frames.shape;
    let numel = c * h * w;

    // noise pushes values out of the displayable range
    let clamped = frames.map(|v| v.clamp(0.0, 1.0))?;
    let data = clamped.as_slice();

    let jobs = (0..b)
        .flat_map(|sample| (0..len).map(move |i| (sample, i)))
        .collect::<Vec<_>>();

    jobs.into_par_iter()
        .try_for_each(|(sample, i)| -> Result<(), String> {
            let offset = (sample * len + i) * numel;
            let frame =
                Tensor3::from_shape_slice([c, h, w], &data[offset..offset + numel], CpuAllocator)
                    .map_err(|e| e.to_string())?;
            let image = frame_to_image(&frame, false).map_err(|e| e.to_string())?;

            let file_name = format!("batch{batch_idx:05}_sample{sample:03}_frame{i:03}.png");
            write_frame_png(out_dir.join(file_name), &image).map_err(|e| e.to_string())
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_frames_follow_windows() -> Result<(), Error> {
        // [2, 7, 1, 1, 1], frame t of sample b holds 10 * b + t
        let frames = Tensor5::from_shape_fn([2, 7, 1, 1, 1], CpuAllocator, |[b, t, ..]| {
            (10 * b + t) as f32
        })?;

        let centres = centre_frames(&frames, 3, 1)?;
        assert_eq!(centres.shape, [2, 5, 1, 1, 1]);
        assert_eq!(
            centres.as_slice(),
            &[1.0, 2.0, 3.0, 4.0, 5.0, 11.0, 12.0, 13.0, 14.0, 15.0]
        );

        let strided = centre_frames(&frames, 3, 2)?;
        assert_eq!(strided.as_slice(), &[1.0, 3.0, 5.0, 11.0, 13.0, 15.0]);

        assert!(centre_frames(&frames, 8, 1).is_err());
        Ok(())
    }

    #[test]
    fn save_clamped_frames() -> Result<(), Error> {
        let tmp_dir = tempfile::tempdir()?;

        let frames = Tensor5::from_shape_vec(
            [1, 2, 1, 1, 2],
            vec![-0.5f32, 0.5, 1.5, 1.0],
            CpuAllocator,
        )?;
        save_frames(tmp_dir.path(), 3, &frames)?;

        let first = vidnoise::io::png::read_image_png_mono8(
            tmp_dir.path().join("batch00003_sample000_frame000.png"),
        )?;
        assert_eq!(first.as_slice(), &[0, 127]);
        assert!(tmp_dir.path().join("batch00003_sample000_frame001.png").exists());
        Ok(())
    }
}
