use std::path::{Path, PathBuf};

use argh::FromArgs;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    choices::{Dataset, LrPolicy, ModelKind},
    error::OptionsError,
};

// crop size of the train phase when none is given
const DEFAULT_TRAIN_CROP_SIZE: usize = 224;

#[derive(FromArgs, Debug, Clone, PartialEq, Serialize)]
/// Sliding-window temporal denoising of video frame sequences.
pub struct Options {
    /// name of the experiment, it decides where to store samples and options
    #[argh(option, default = "String::from(\"experiment_1\")")]
    pub task_name: String,

    /// gpu ids, e.g. 0 or 0,1,2 or 0,2; use -1 for CPU
    #[argh(option, default = "String::from(\"0\")")]
    pub gpu_ids: String,

    /// options are saved here
    #[argh(option, default = "PathBuf::from(\"./checkpoints\")")]
    pub checkpoints_dir: PathBuf,

    /// denoiser applied to every window [temporal_mean | temporal_wiener]
    #[argh(option, default = "ModelKind::TemporalWiener")]
    pub model: ModelKind,

    /// name of the dataset [UCF101 | HMDB51 | Kinetics]
    #[argh(option, default = "Dataset::Ucf101")]
    pub dataset: Dataset,

    /// file list with one frames directory and label per line
    #[argh(option)]
    pub file_list: Option<PathBuf>,

    /// number of threads for loading and denoising
    #[argh(option, default = "4")]
    pub num_threads: usize,

    /// input batch size
    #[argh(option, default = "64")]
    pub batch_size: usize,

    /// scale frames to this size
    #[argh(option, default = "240")]
    pub load_size: usize,

    /// crop frames to this size, defaults to 224 for train and to load_size for test
    #[argh(option)]
    pub crop_size: Option<usize>,

    /// clip length for each loading
    #[argh(option, default = "16")]
    pub sequence_length: usize,

    /// frame interval between sequences, -1 uses sequence_length
    #[argh(option, default = "-1")]
    pub frame_step: i64,

    /// distance between consecutive frames in a sequence
    #[argh(option, default = "1")]
    pub temp_stride: usize,

    /// number of frames consumed by the denoiser
    #[argh(option, default = "5")]
    pub window_size: usize,

    /// seed of the loader and noise generators
    #[argh(option, default = "12")]
    pub seed: u64,

    /// print more debugging information
    #[argh(switch)]
    pub verbose: bool,

    /// customized suffix appended to task_name, e.g. {model}_{dataset}
    #[argh(option, default = "String::new()")]
    pub suffix: String,

    /// phase specific options
    #[argh(subcommand)]
    #[serde(skip)]
    pub phase: Phase,
}

/// The phase of an experiment and its options.
#[derive(FromArgs, Debug, Clone, PartialEq)]
#[argh(subcommand)]
pub enum Phase {
    /// Training options.
    Train(TrainOptions),
    /// Test options.
    Test(TestOptions),
}

#[derive(FromArgs, Debug, Clone, PartialEq, Serialize)]
/// Training options.
#[argh(subcommand, name = "train")]
pub struct TrainOptions {
    /// frequency of showing training results on console
    #[argh(option, default = "100")]
    pub print_freq: usize,

    /// number of epochs with the initial learning rate
    #[argh(option, default = "100")]
    pub n_epochs: usize,

    /// number of epochs to linearly decay the learning rate to zero
    #[argh(option, default = "100")]
    pub n_epochs_decay: usize,

    /// momentum term of the optimizer
    #[argh(option, default = "0.5")]
    pub momentum: f32,

    /// initial learning rate
    #[argh(option, default = "0.0002")]
    pub lr: f32,

    /// learning rate policy [linear | step | plateau | cosine]
    #[argh(option, default = "LrPolicy::Linear")]
    pub lr_policy: LrPolicy,

    /// multiply by a gamma every lr_iters iterations
    #[argh(option, default = "50")]
    pub lr_iters: usize,

    /// lower bound of the training noise standard deviation
    #[argh(option, default = "0.02")]
    pub noise_min: f32,

    /// upper bound of the training noise standard deviation
    #[argh(option, default = "0.2")]
    pub noise_max: f32,
}

#[derive(FromArgs, Debug, Clone, PartialEq, Serialize)]
/// Test options.
#[argh(subcommand, name = "test")]
pub struct TestOptions {
    /// saves result frames here
    #[argh(option, default = "PathBuf::from(\"./results/\")")]
    pub results_dir: PathBuf,

    /// aspect ratio of result images
    #[argh(option, default = "1.0")]
    pub aspect_ratio: f32,

    /// standard deviation of the noise added to the clean frames
    #[argh(option, default = "0.1")]
    pub noise_sigma: f32,

    /// frames between the starts of consecutive denoiser windows
    #[argh(option, default = "1")]
    pub window_stride: usize,

    /// denoise the windows of a batch in parallel
    #[argh(switch)]
    pub parallel: bool,

    /// write the denoised frames as png files
    #[argh(switch)]
    pub save_frames: bool,
}

fn invalid(option: &'static str, reason: impl Into<String>) -> OptionsError {
    OptionsError::InvalidValue {
        option,
        reason: reason.into(),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

impl Options {
    /// Parse the options from the process arguments, exiting on error or help.
    pub fn from_env() -> Self {
        argh::from_env()
    }

    /// Name of the phase, `train` or `test`.
    pub fn phase(&self) -> &'static str {
        match self.phase {
            Phase::Train(_) => "train",
            Phase::Test(_) => "test",
        }
    }

    /// Whether the options describe a training run.
    pub fn is_train(&self) -> bool {
        matches!(self.phase, Phase::Train(_))
    }

    /// The crop size, resolving the phase default.
    pub fn crop_size(&self) -> usize {
        match (self.crop_size, &self.phase) {
            (Some(crop_size), _) => crop_size,
            (None, Phase::Train(_)) => DEFAULT_TRAIN_CROP_SIZE,
            (None, Phase::Test(_)) => self.load_size,
        }
    }

    /// Check the values that the loader and the denoiser cannot work with.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be positive"));
        }
        if self.sequence_length == 0 {
            return Err(invalid("sequence_length", "must be positive"));
        }
        if self.temp_stride == 0 {
            return Err(invalid("temp_stride", "must be positive"));
        }
        if self.window_size == 0 {
            return Err(invalid("window_size", "must be positive"));
        }
        if self.crop_size() == 0 {
            return Err(invalid("crop_size", "must be positive"));
        }

        match &self.phase {
            Phase::Train(train) => {
                if !(train.noise_min >= 0.0 && train.noise_min <= train.noise_max) {
                    return Err(invalid(
                        "noise_min",
                        format!(
                            "expected 0 <= noise_min <= noise_max, got [{}, {}]",
                            train.noise_min, train.noise_max
                        ),
                    ));
                }
            }
            Phase::Test(test) => {
                if !(test.noise_sigma.is_finite() && test.noise_sigma >= 0.0) {
                    return Err(invalid("noise_sigma", "must be finite and non negative"));
                }
                if test.window_stride == 0 {
                    return Err(invalid("window_stride", "must be positive"));
                }
                if self.sequence_length < self.window_size {
                    return Err(invalid(
                        "sequence_length",
                        format!("must be at least window_size ({})", self.window_size),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Every option and its value, keyed by option name in sorted order.
    ///
    /// Phase options are merged with the base options and `crop_size` holds its
    /// resolved value.
    pub fn option_map(&self) -> Result<Map<String, Value>, OptionsError> {
        let mut map = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let phase = match &self.phase {
            Phase::Train(train) => serde_json::to_value(train)?,
            Phase::Test(test) => serde_json::to_value(test)?,
        };
        if let Value::Object(phase) = phase {
            map.extend(phase);
        }

        map.insert("crop_size".to_string(), Value::from(self.crop_size()));
        map.insert("phase".to_string(), Value::from(self.phase()));
        Ok(map)
    }

    /// Append the expanded suffix to the task name.
    ///
    /// `{name}` placeholders in the suffix are replaced by the value of the option
    /// `name`, e.g. `{model}_{dataset}`. An empty suffix leaves the task name
    /// untouched.
    pub fn apply_suffix(&mut self) -> Result<(), OptionsError> {
        if self.suffix.is_empty() {
            return Ok(());
        }

        let values = self.option_map()?;
        let mut expanded = String::new();
        let mut rest = self.suffix.as_str();

        while let Some(open) = rest.find('{') {
            expanded.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| OptionsError::InvalidSuffix(self.suffix.clone()))?;

            let name = &after[..close];
            let value = values
                .get(name)
                .ok_or_else(|| OptionsError::UnknownPlaceholder(name.to_string()))?;
            expanded.push_str(&display_value(value));
            rest = &after[close + 1..];
        }
        if rest.contains('}') {
            return Err(OptionsError::InvalidSuffix(self.suffix.clone()));
        }
        expanded.push_str(rest);

        self.task_name = format!("{}_{}", self.task_name, expanded);
        Ok(())
    }

    /// Render the options as a table, one `key: value` line per option.
    pub fn format_options(&self) -> Result<String, OptionsError> {
        let mut message = String::new();
        message.push_str("----------------- Options ---------------\n");
        for (key, value) in self.option_map()? {
            message.push_str(&format!(".. {:>25}: {:<30}\n", key, display_value(&value)));
        }
        message.push_str("----------------- End -------------------");
        Ok(message)
    }

    /// Directory of the experiment, `<checkpoints_dir>/<task_name>`.
    pub fn experiment_dir(&self) -> PathBuf {
        self.checkpoints_dir.join(&self.task_name)
    }

    /// Write the options table to `<checkpoints_dir>/<task_name>/<phase>_opts.txt`.
    ///
    /// Returns the path of the written file.
    pub fn save_options(&self) -> Result<PathBuf, OptionsError> {
        let dir = self.experiment_dir();
        std::fs::create_dir_all(&dir)?;

        let file_path = dir.join(format!("{}_opts.txt", self.phase()));
        write_options(&file_path, &self.format_options()?)?;
        log::debug!("options saved to {}", file_path.display());
        Ok(file_path)
    }

    /// The gpu ids as integers.
    ///
    /// Negative ids are dropped, so `-1` selects the CPU.
    pub fn gpu_ids(&self) -> Result<Vec<usize>, OptionsError> {
        let mut ids = Vec::new();
        for token in self.gpu_ids.split(',') {
            let token = token.trim();
            let id = token
                .parse::<i64>()
                .map_err(|_| OptionsError::InvalidGpuId(token.to_string()))?;
            if id >= 0 {
                ids.push(id as usize);
            }
        }
        Ok(ids)
    }
}

fn write_options(file_path: &Path, message: &str) -> Result<(), OptionsError> {
    std::fs::write(file_path, format!("{message}\n"))?;
    Ok(())
}
