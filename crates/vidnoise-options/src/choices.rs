use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::error::OptionsError;

macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $option:literal {
            $($(#[$vmeta:meta])* $variant:ident => $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            const CHOICES: &'static str = concat!($($value, "|"),+);

            /// The accepted values, separated by `|`.
            pub fn choices() -> &'static str {
                Self::CHOICES.trim_end_matches('|')
            }

            /// The command line spelling of the value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = OptionsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    _ => Err(OptionsError::InvalidChoice {
                        option: $option,
                        value: s.to_string(),
                        choices: Self::choices(),
                    }),
                }
            }
        }
    };
}

choice_enum! {
    /// The built-in denoiser applied to every window.
    ModelKind, "model" {
        /// Per-pixel temporal mean.
        TemporalMean => "temporal_mean",
        /// Temporal Wiener shrinkage driven by the noise map.
        TemporalWiener => "temporal_wiener",
    }
}

choice_enum! {
    /// The video dataset the file list belongs to.
    Dataset, "dataset" {
        /// UCF101 action recognition videos.
        Ucf101 => "UCF101",
        /// HMDB51 action recognition videos.
        Hmdb51 => "HMDB51",
        /// Kinetics action recognition videos.
        Kinetics => "Kinetics",
    }
}

choice_enum! {
    /// Learning rate schedule.
    LrPolicy, "lr_policy" {
        /// Linear decay to zero.
        Linear => "linear",
        /// Multiply by a gamma every `lr_iters` iterations.
        Step => "step",
        /// Decay when the loss plateaus.
        Plateau => "plateau",
        /// Cosine annealing.
        Cosine => "cosine",
    }
}
